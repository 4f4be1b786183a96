//! Structured logging for the sidecar server
//!
//! Console output (pretty, compact or JSON), a daily rotated log file, or
//! both, driven by the `logging` section of the configuration. Request
//! completions go through [`log_event!`] so they share one field layout.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::LoggingConfig;

const LOG_FILE: &str = "sidecar-server.log";

/// Dependencies that are noisy at `info`
const QUIET: [&str; 4] = ["hyper=warn", "h2=warn", "tokio=warn", "runtime=warn"];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Both,
}

impl LogOutput {
    /// Unknown names fall back to `Stdout`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }

    fn console(self) -> bool {
        matches!(self, LogOutput::Stdout | LogOutput::Both)
    }

    fn file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

/// Filter from the configured level, with dependency noise capped at `warn`
pub fn level_filter(level: &str) -> EnvFilter {
    let mut filter = EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("invalid log level {level:?} ({e}), using info");
        EnvFilter::new("info")
    });
    for directive in QUIET {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_thread_ids(true)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    }
}

fn file_layer(format: LogFormat, directory: &Path) -> BoxedLayer {
    if let Err(e) = std::fs::create_dir_all(directory) {
        eprintln!("cannot create log directory {}: {e}", directory.display());
    }
    let appender = RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE);

    // Files never get ANSI colours; JSON stays JSON
    match format {
        LogFormat::Json => fmt::layer().json().with_writer(appender).boxed(),
        _ => fmt::layer().with_writer(appender).with_ansi(false).boxed(),
    }
}

/// Install the global subscriber. Call once, before the store is opened.
pub fn init(config: &LoggingConfig) {
    let format = LogFormat::parse(&config.format);
    let output = LogOutput::parse(&config.output);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if output.console() {
        layers.push(console_layer(format));
    }
    if output.file() {
        layers.push(file_layer(format, Path::new(&config.directory)));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(level_filter(&config.level))
        .init();

    tracing::info!(
        format = ?format,
        output = ?output,
        level = %config.level,
        "logging initialized"
    );
}

/// Structured event with an `event` name and arbitrary debug-formatted fields
///
/// ```ignore
/// log_event!(
///     level: tracing::Level::INFO,
///     event: "rpc_completed",
///     method: "execute_query",
///     duration_ms: 42,
/// );
/// ```
#[macro_export]
macro_rules! log_event {
    (level: $level:expr, event: $event:expr $(, $key:ident: $value:expr)* $(,)?) => {
        tracing::event!(
            $level,
            event = $event
            $(, $key = ?$value)*
        );
    };
}
