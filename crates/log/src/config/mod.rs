//! Configuration types
//!
//! - `base`: core configuration structs (Config, Format)
//! - `writer`: writer and display configuration
//! - `presets`: pre-configured setups (development, production, test)

mod base;
mod presets;
mod writer;

pub use base::{Config, Format};
pub use writer::{DisplayConfig, WriterConfig};
