//! # Reservoir Log
//!
//! Logging setup for services built on `reservoir-pool`. The pool itself
//! only emits `tracing` events; this crate installs the subscriber that
//! formats and writes them.
//!
//! ```no_run
//! fn main() -> reservoir_log::LogResult<()> {
//!     let _guard = reservoir_log::init()?;
//!     tracing::info!(port = 8080, "Server starting");
//!     Ok(())
//! }
//! ```

mod builder;
mod config;
mod error;
mod writer;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Format, WriterConfig};
pub use error::{LogError, LogResult};

/// Initialize from the environment, falling back to the development or
/// production preset depending on the build profile.
///
/// # Errors
/// Returns `Filter` for an unparsable `RESERVOIR_LOG`/`RUST_LOG` and `Init`
/// if a global subscriber is already installed.
pub fn init() -> LogResult<LoggerGuard> {
    if std::env::var_os("RESERVOIR_LOG").is_some() || std::env::var_os("RUST_LOG").is_some() {
        init_with(Config::from_env())
    } else if cfg!(debug_assertions) {
        init_with(Config::development())
    } else {
        init_with(Config::production())
    }
}

/// Initialize with custom configuration
///
/// # Errors
/// See [`LoggerBuilder::build`].
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Initialize for tests. Safe to call from every test; only the first call
/// in a process installs anything.
pub fn init_test() -> LoggerGuard {
    if tracing::dispatcher::has_been_set() {
        return LoggerGuard::noop();
    }
    init_with(Config::test()).unwrap_or_else(|_| LoggerGuard::noop())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_test_is_idempotent_and_blocks_later_installs() {
        let _first = init_test();
        let _second = init_test();

        let err = init_with(Config::test()).unwrap_err();
        assert!(matches!(err, LogError::Init(_)), "got {err:?}");
    }
}
