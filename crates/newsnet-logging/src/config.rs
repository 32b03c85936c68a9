//! Logging settings, usually read from the `[logging]` table of a site config

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where log output goes and how it is filtered
///
/// `RUST_LOG`, when set, replaces [`filter`](LogConfig::filter) entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base level, e.g. `info`
    pub level: String,
    /// Per-target overrides such as `newsnet_sync=debug`
    pub directives: Vec<String>,
    /// Terminal output; `None` keeps the terminal quiet
    pub console: Option<ConsoleOutput>,
    /// Rolling file output
    pub file: Option<FileOutput>,
    /// Attach the active span stack to JSON records
    pub json_spans: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            directives: Vec::new(),
            console: Some(ConsoleOutput::default()),
            file: None,
            json_spans: true,
        }
    }
}

impl LogConfig {
    /// Pretty, colored terminal output with protocol crates at debug
    pub fn development() -> Self {
        Self {
            level: "info".into(),
            directives: vec![
                "newsnet_sync=debug".into(),
                "newsnet_distribution=debug".into(),
                "newsnet_server=debug".into(),
            ],
            console: Some(ConsoleOutput {
                format: LogFormat::Pretty,
                ansi: true,
            }),
            ..Self::default()
        }
    }

    /// JSON files under `log_dir`, a month of daily files, nothing on the terminal
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            console: None,
            file: Some(FileOutput {
                directory: log_dir,
                keep: Some(30),
                ..FileOutput::default()
            }),
            ..Self::default()
        }
    }

    /// Warnings only, compact, for test binaries
    pub fn testing() -> Self {
        Self {
            level: "warn".into(),
            console: Some(ConsoleOutput {
                format: LogFormat::Compact,
                ansi: false,
            }),
            ..Self::default()
        }
    }

    /// Filter string: the base level followed by the overrides
    pub fn filter(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Record layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Multi-line, human oriented
    Pretty,
    /// Single line, human oriented
    Compact,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleOutput {
    pub format: LogFormat,
    pub ansi: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutput {
    pub directory: PathBuf,
    /// File names are `<prefix>.<date>.log`, or `<prefix>.log` without rotation
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Rotated files kept on disk; `None` keeps all of them
    pub keep: Option<usize>,
}

impl Default for FileOutput {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "newsnet".into(),
            rotation: RotationStrategy::Daily,
            keep: Some(7),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// A single file, truncated on start
    Never,
}
