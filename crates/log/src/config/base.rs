//! Core configuration types

use serde::{Deserialize, Serialize};

use super::{DisplayConfig, WriterConfig};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level filter (e.g., "info", "debug,reservoir_pool=trace")
    pub level: String,

    /// Output format
    pub format: Format,

    /// Output writer
    pub writer: WriterConfig,

    /// Display configuration
    pub display: DisplayConfig,

    /// Enable runtime reload of the level filter
    pub reloadable: bool,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Human-readable, multi-line
    Pretty,
    /// Compact single-line output
    Compact,
    /// Structured JSON output, one object per line
    Json,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Compact,
            writer: WriterConfig::Stderr,
            display: DisplayConfig::default(),
            reloadable: false,
        }
    }
}
