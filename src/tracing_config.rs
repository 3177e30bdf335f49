//! Tracing configuration module for structured logging and observability
//!
//! The library only emits `log` records and `tracing` events; the binary
//! decides where they go by installing a subscriber configured here. `log`
//! records are bridged into the same subscriber.

use std::path::PathBuf;
use tracing::Subscriber;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Configuration for tracing output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable console output with colors (default for CLI)
    Console,
    /// Compact console output without colors for CI environments
    Compact,
    /// JSON structured logging
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Configuration for tracing output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TracingOutput {
    /// Output to stderr (default)
    Console,
    /// Output to a file
    #[cfg(feature = "tracing-files")]
    File(PathBuf),
}

/// Keeps background log writers alive until dropped
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct TracingGuard {
    #[cfg(feature = "tracing-files")]
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Tracing configuration builder
#[derive(Debug)]
pub struct TracingConfig {
    /// Verbosity level (maps to log levels)
    pub verbosity: u8,
    pub format: TracingFormat,
    pub output: TracingOutput,
    /// Environment filter string (overrides verbosity if set)
    pub env_filter: Option<String>,
    /// Session ID for correlation
    pub session_id: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbosity: 0,
            format: TracingFormat::Console,
            output: TracingOutput::Console,
            env_filter: None,
            session_id: None,
        }
    }
}

impl TracingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity level (0-3+)
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Set custom environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Set session ID for request correlation
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Convert verbosity level to tracing filter string
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Filter applied to the subscriber: explicit filter, then `RUST_LOG`, then verbosity
    fn build_filter(&self) -> anyhow::Result<EnvFilter> {
        if let Some(env_filter) = &self.env_filter {
            return Ok(EnvFilter::try_new(env_filter)?);
        }
        if self.verbosity == 0 {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        Ok(EnvFilter::try_new(self.verbosity_to_filter())?)
    }

    /// Build the subscriber without installing it
    ///
    /// # Errors
    /// - Invalid filter directives
    pub fn build(
        &self,
    ) -> anyhow::Result<(impl Subscriber + Send + Sync + 'static, TracingGuard)> {
        use tracing_subscriber::fmt;

        let filter = self.build_filter()?;
        #[allow(unused_mut)]
        let mut guard = TracingGuard::default();

        let fmt_layer: BoxedLayer = match (&self.format, &self.output) {
            (TracingFormat::Console, TracingOutput::Console) => Box::new(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false)
                    .with_level(true)
                    .compact(),
            ),

            (TracingFormat::Compact, TracingOutput::Console) => Box::new(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .with_target(false)
                    .compact(),
            ),

            #[cfg(feature = "tracing-json")]
            (TracingFormat::Json, TracingOutput::Console) => Box::new(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            ),

            #[cfg(feature = "tracing-files")]
            (format, TracingOutput::File(path)) => {
                use tracing_appender::{non_blocking, rolling};

                let file_appender = rolling::never(
                    path.parent()
                        .filter(|p| !p.as_os_str().is_empty())
                        .unwrap_or_else(|| std::path::Path::new(".")),
                    path.file_name()
                        .unwrap_or_else(|| std::ffi::OsStr::new("bgremove-batch.log")),
                );
                let (file_writer, file_guard) = non_blocking(file_appender);
                guard._file_guard = Some(file_guard);

                match format {
                    #[cfg(feature = "tracing-json")]
                    TracingFormat::Json => Box::new(
                        fmt::layer()
                            .json()
                            .with_writer(file_writer)
                            .with_current_span(true)
                            .with_span_list(true),
                    ),
                    _ => Box::new(
                        fmt::layer()
                            .with_ansi(false)
                            .with_writer(file_writer)
                            .compact(),
                    ),
                }
            },
        };

        Ok((Registry::default().with(fmt_layer).with(filter), guard))
    }

    /// Initialize the global tracing subscriber
    ///
    /// # Errors
    /// - Invalid filter directives
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<TracingGuard> {
        let (subscriber, guard) = self.build()?;
        subscriber.try_init()?;

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "Background removal session started");
        }

        Ok(guard)
    }
}

/// Initialize tracing with CLI-friendly defaults and a fresh session id
///
/// `log_file` redirects the output to a file; it requires the
/// `tracing-files` feature.
///
/// # Errors
/// - A global subscriber is already installed
/// - `log_file` was given without file support compiled in
pub fn init_cli_tracing(
    verbosity: u8,
    json: bool,
    log_file: Option<PathBuf>,
) -> anyhow::Result<TracingGuard> {
    let session_id = uuid::Uuid::new_v4().to_string();

    #[cfg(feature = "tracing-json")]
    let format = if json {
        TracingFormat::Json
    } else {
        TracingFormat::Console
    };
    #[cfg(not(feature = "tracing-json"))]
    let format = if json {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };

    let output = match log_file {
        None => TracingOutput::Console,
        #[cfg(feature = "tracing-files")]
        Some(path) => TracingOutput::File(path),
        #[cfg(not(feature = "tracing-files"))]
        Some(path) => anyhow::bail!(
            "Cannot log to {}: built without the tracing-files feature",
            path.display()
        ),
    };

    TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_output(output)
        .with_session_id(session_id)
        .init()
}

/// Span creation helpers for common operations
pub mod spans {
    use tracing::{Level, Span};

    /// Span for the entire CLI invocation
    pub fn session(mode: &str, model_name: &str, provider: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "session",
            mode = %mode,
            model_name = %model_name,
            provider = %provider
        )
    }

    /// Span for one dispatched batch
    pub fn batch_processing(file_count: usize, model_name: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "batch_processing",
            file_count = %file_count,
            model_name = %model_name
        )
    }

    /// Span for model download operations
    pub fn download(model_name: &str, destination: &std::path::Path) -> Span {
        tracing::span!(
            Level::INFO,
            "download",
            model_name = %model_name,
            destination = %destination.display()
        )
    }
}

/// Event helpers for common logging patterns
pub mod events {
    use tracing::{error, warn};

    /// Log an error with context
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        error!(error = %error, context = %context, "Operation failed");
    }

    /// Log a warning with recommendation
    pub fn warning_with_recommendation(message: &str, recommendation: &str) {
        warn!(
            recommendation = %recommendation,
            "{}", message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "warn");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(3).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(10).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_format(TracingFormat::Compact)
            .with_session_id("test-session");

        assert_eq!(config.verbosity, 2);
        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
    }

    #[test]
    fn test_explicit_filter_wins() {
        let config = TracingConfig::new()
            .with_verbosity(3)
            .with_env_filter("bgremove_batch=debug");
        assert!(config.build_filter().is_ok());

        let bad = TracingConfig::new().with_env_filter("[[[not a filter");
        assert!(bad.build_filter().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.verbosity, 0);
        assert_eq!(config.format, TracingFormat::Console);
        assert_eq!(config.output, TracingOutput::Console);
        assert!(config.env_filter.is_none());
        assert!(config.session_id.is_none());
    }

    #[cfg(feature = "tracing-files")]
    #[test]
    fn test_file_output_writes_events() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let (subscriber, guard) = TracingConfig::new()
            .with_env_filter("info")
            .with_output(TracingOutput::File(path.clone()))
            .build()
            .unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(file = "a.png", "written to the log file");
            tracing::debug!("filtered out");
        });
        drop(guard);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("written to the log file"));
        assert!(contents.contains("a.png"));
        assert!(!contents.contains("filtered out"));
    }

    #[cfg(not(feature = "tracing-files"))]
    #[test]
    fn test_log_file_needs_file_support() {
        let result = init_cli_tracing(0, false, Some(PathBuf::from("run.log")));
        assert!(result.is_err());
    }
}
