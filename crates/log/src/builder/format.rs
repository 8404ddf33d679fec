//! Format layer creation macros
//!
//! Each fmt format has its own layer type, so these expand in place in
//! every `match` arm of the builder.

/// Human-readable layer for `pretty` and `compact`
macro_rules! create_fmt_layer {
    ($format:ident, $display:expr, $writer:expr) => {{
        tracing_subscriber::fmt::layer()
            .$format()
            .with_writer($writer)
            .with_ansi($display.colors)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source)
            .with_thread_ids($display.thread_ids)
            .with_thread_names($display.thread_names)
    }};
}

/// JSON layer (has additional options)
macro_rules! create_json_layer {
    ($display:expr, $writer:expr) => {{
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer($writer)
            .with_current_span(true)
            .with_span_list($display.span_list)
            .flatten_event($display.flatten)
            .with_target($display.target)
            .with_file($display.source)
            .with_line_number($display.source)
            .with_thread_ids($display.thread_ids)
            .with_thread_names($display.thread_names)
    }};
}
