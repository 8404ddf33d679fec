//! Writer and display configuration

use serde::{Deserialize, Serialize};

/// Where formatted events go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterConfig {
    /// Write to stderr
    #[default]
    Stderr,
    /// Write to stdout
    Stdout,
    /// Write through libtest's capture, so output only shows for failing tests
    Test,
}

/// Display configuration
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Use ANSI colors
    pub colors: bool,
    /// Show the event target (module path)
    pub target: bool,
    /// Show source location (`file:line`)
    pub source: bool,
    /// Show thread ids
    pub thread_ids: bool,
    /// Show thread names
    pub thread_names: bool,
    /// Include the list of entered spans (JSON only)
    pub span_list: bool,
    /// Put event fields at the top level of the object (JSON only)
    pub flatten: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            colors: true,
            target: true,
            source: false,
            thread_ids: false,
            thread_names: false,
            span_list: false,
            flatten: false,
        }
    }
}

impl DisplayConfig {
    /// Apply `RESERVOIR_LOG_*` display overrides from the environment.
    pub(crate) fn parse_env(&mut self) {
        if let Some(colors) = env_flag("RESERVOIR_LOG_COLORS") {
            self.colors = colors;
        }
        if let Some(source) = env_flag("RESERVOIR_LOG_SOURCE") {
            self.source = source;
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.colors = false;
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
