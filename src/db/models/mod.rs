pub mod study_record;
pub mod subject;

pub use study_record::StudyRecord;
pub(crate) use study_record::StoredStudyRecord;
pub use subject::{
    default_subjects, NewSubject, Subject, SubjectUpdate, DEFAULT_SUBJECT_IMAGE,
    UNTITLED_SUBJECT_NAME,
};
pub(crate) use subject::StoredSubject;
