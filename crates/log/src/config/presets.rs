//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format, WriterConfig};

impl Config {
    /// Create configuration from environment variables
    ///
    /// `RESERVOIR_LOG` (falling back to `RUST_LOG`) sets the filter and
    /// `RESERVOIR_LOG_FORMAT` picks the format. Unknown formats keep the
    /// default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = std::env::var("RESERVOIR_LOG") {
            config.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }

        if let Ok(format) = std::env::var("RESERVOIR_LOG_FORMAT")
            && let Ok(format) = format.parse()
        {
            config.format = format;
        }

        config.display.parse_env();
        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level, reloadable)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            reloadable: true,
            ..Self::default()
        }
    }

    /// Test configuration (trace level, captured by the test harness)
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            writer: WriterConfig::Test,
            display: DisplayConfig {
                colors: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}
