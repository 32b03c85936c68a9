//! Structured logging for Newspack Network services
//!
//! Installs a global `tracing` subscriber from a [`LogConfig`]: an
//! `EnvFilter` (from `RUST_LOG`, else the configured filter), an optional
//! terminal layer and an optional rolling JSON file.
//!
//! ```ignore
//! use newsnet_logging::{LogConfig, SubscriberBuilder};
//!
//! // Hold the guard until exit so the file writer drains
//! let _guard = SubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```

pub mod config;

pub use config::{ConsoleOutput, FileOutput, LogConfig, LogFormat, RotationStrategy};

use std::fs::{self, File};
use std::io;

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Cannot open log file: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot set up log rotation: {0}")]
    Rotation(String),

    #[error("A global subscriber is already set: {0}")]
    AlreadyInitialized(String),
}

/// Dropping the guard flushes the file writer
#[must_use]
#[derive(Default)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

pub struct SubscriberBuilder {
    config: LogConfig,
}

impl SubscriberBuilder {
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the base level, keeping per-target directives
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn with_console(mut self, console: Option<ConsoleOutput>) -> Self {
        self.config.console = console;
        self
    }

    pub fn with_file_output(mut self, file: FileOutput) -> Self {
        self.config.file = Some(file);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn layers(&self) -> Result<(Vec<BoxedLayer>, Option<WorkerGuard>), LogError> {
        let spans = self.config.json_spans;
        let mut layers = Vec::new();

        if let Some(console) = &self.config.console {
            layers.push(format_layer(console.format, console.ansi, spans, io::stdout));
        }

        let guard = match &self.config.file {
            Some(file) => {
                let (writer, guard) = open_file(file)?;
                layers.push(format_layer(LogFormat::Json, false, spans, writer));
                Some(guard)
            }
            None => None,
        };

        Ok((layers, guard))
    }

    /// Install globally; fails when a subscriber is already set
    pub fn try_init(self) -> Result<LogGuard, LogError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.filter()));
        let (layers, guard) = self.layers()?;

        Registry::default()
            .with(layers)
            .with(filter)
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        Ok(LogGuard { _file: guard })
    }

    /// Install globally; a failure is reported on stderr and logging stays off
    pub fn init(self) -> LogGuard {
        self.try_init().unwrap_or_else(|e| {
            eprintln!("newsnet: logging disabled: {e}");
            LogGuard::default()
        })
    }
}

impl Default for SubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn format_layer<W>(format: LogFormat, ansi: bool, spans: bool, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let base = fmt::layer().with_ansi(ansi).with_writer(writer);
    match format {
        LogFormat::Json => base
            .json()
            .flatten_event(true)
            .with_current_span(spans)
            .with_span_list(spans)
            .boxed(),
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Compact => base.compact().boxed(),
    }
}

fn open_file(file: &FileOutput) -> Result<(NonBlocking, WorkerGuard), LogError> {
    fs::create_dir_all(&file.directory)?;

    let rotation = match file.rotation {
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Never => {
            let path = file.directory.join(format!("{}.log", file.prefix));
            return Ok(tracing_appender::non_blocking(File::create(path)?));
        }
    };

    let mut appender = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&file.prefix)
        .filename_suffix("log");
    if let Some(keep) = file.keep {
        appender = appender.max_log_files(keep);
    }
    let appender = appender
        .build(&file.directory)
        .map_err(|e| LogError::Rotation(e.to_string()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Safe to call from every test
pub fn init_testing() {
    let _ = SubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
