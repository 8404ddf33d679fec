//! Logger builder implementation
//!
//! - `format`: format layer creation macros
//! - `reload`: runtime filter reload logic

#[macro_use]
mod format;
mod reload;

pub use reload::ReloadHandle;

use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};
use crate::writer;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by a successful build
///
/// Holds the reload handle when the logger was built with `reloadable`.
#[derive(Debug)]
#[must_use = "dropping the guard discards the reload handle"]
pub struct LoggerGuard {
    reload_handle: Option<ReloadHandle>,
}

/// Install `Registry + filter + fmt` as the global subscriber.
macro_rules! init_subscriber {
    ($filter_layer:expr, $fmt_layer:expr) => {
        Registry::default()
            .with($filter_layer)
            .with($fmt_layer)
            .try_init()
            .map_err(|e| LogError::Init(e.to_string()))?
    };
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the logger as the global default
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the level filter cannot be parsed
    /// - a global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let Self { config } = self;

        let filter = EnvFilter::try_new(&config.level)
            .map_err(|e| LogError::filter(&config.level, e))?;
        let writer = writer::make_writer(config.writer);
        let (filter_layer, reload_handle) =
            reload::create_filter_layer(filter, &config.level, config.reloadable);

        let display = &config.display;
        match config.format {
            Format::Pretty => {
                init_subscriber!(filter_layer, create_fmt_layer!(pretty, display, writer));
            }
            Format::Compact => {
                init_subscriber!(filter_layer, create_fmt_layer!(compact, display, writer));
            }
            Format::Json => {
                init_subscriber!(filter_layer, create_json_layer!(display, writer));
            }
        }

        tracing::debug!(level = %config.level, format = ?config.format, "Logger initialized");
        Ok(LoggerGuard { reload_handle })
    }
}

impl LoggerGuard {
    /// Handle for changing the level filter, if the logger is reloadable
    #[must_use]
    pub fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.reload_handle.as_ref()
    }

    pub(crate) fn noop() -> Self {
        Self {
            reload_handle: None,
        }
    }
}
