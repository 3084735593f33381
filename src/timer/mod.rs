pub mod controller;
pub mod format;
pub mod persistence;
pub mod state;

pub use controller::TimerController;
pub use format::{format_elapsed, format_elapsed_secs};
pub use persistence::TimerStore;
pub use state::{PersistedTimer, TimerSnapshot, TimerState, TimerStatus};
