//! Error handling for reservoir-log

use thiserror::Error;

/// Result type for logging setup
pub type LogResult<T> = std::result::Result<T, LogError>;

/// Errors raised while installing or reconfiguring the logger
#[derive(Debug, Error)]
pub enum LogError {
    /// The filter directive string could not be parsed
    #[error("Invalid filter '{filter}': {reason}")]
    Filter {
        /// The rejected directive string
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Logger initialization failed: {0}")]
    Init(String),

    /// The reloadable filter could not be swapped
    #[error("Filter reload failed: {0}")]
    Reload(String),
}

impl LogError {
    pub(crate) fn filter(filter: &str, reason: impl std::fmt::Display) -> Self {
        Self::Filter {
            filter: filter.to_string(),
            reason: reason.to_string(),
        }
    }
}
