//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Storage and timer code log on every write; flipping the flag in one module
//! silences that module without touching `RUST_LOG` for the rest of the crate.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("saved {} subjects", count);
//! ```

/// Info-level log, emitted only when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Debug-level log, emitted only when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Warn-level log, emitted only when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Error-level log, emitted only when the calling module's `ENABLE_LOGS` is true.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Initialize `env_logger` (reads `RUST_LOG`, defaults to Info).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
