mod fixtures;
pub use fixtures::*;

pub use studytime::{
    clock::Clock,
    db::{NewSubject, SubjectUpdate},
    error::TrackerError,
};
