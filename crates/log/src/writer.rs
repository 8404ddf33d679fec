//! Writer implementations

use std::io;

use tracing_subscriber::fmt::TestWriter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::WriterConfig;

/// Create a writer from configuration
pub(crate) fn make_writer(config: WriterConfig) -> BoxMakeWriter {
    match config {
        WriterConfig::Stderr => BoxMakeWriter::new(io::stderr),
        WriterConfig::Stdout => BoxMakeWriter::new(io::stdout),
        WriterConfig::Test => BoxMakeWriter::new(TestWriter::default()),
    }
}
