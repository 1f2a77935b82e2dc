//! Local log sinks.
//!
//! Every report is written locally before anything is sent. Sinks have two
//! channels: a low one for debug/info lines and a high one for warnings and
//! above.
//!
//! - [`FileSink`]: two append-only files
//! - [`TracingSink`]: re-emits lines as `tracing` events
//! - [`MemorySink`]: keeps lines in memory
//! - [`MultiSink`]: fans out to several sinks

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::types::SinkLevel;

/// `tracing` target for the low channel.
pub const LOW_TARGET: &str = "tg_reports::log";

/// `tracing` target for the high channel.
pub const HIGH_TARGET: &str = "tg_reports::err";

/// Trait for local log sinks.
pub trait LogSink: Send + Sync + fmt::Debug {
    /// Writes one formatted line at the given level.
    ///
    /// # Errors
    ///
    /// Returns an error if the line could not be written.
    fn write(&self, level: SinkLevel, line: &str) -> Result<()>;
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn write(&self, level: SinkLevel, line: &str) -> Result<()> {
        (**self).write(level, line)
    }
}

/// Locations and filtering for the file sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSinkConfig {
    /// File receiving the low channel (debug/info).
    pub info_path: PathBuf,
    /// File receiving the high channel (warning and above).
    pub error_path: PathBuf,
    /// Whether debug lines are written.
    pub debug: bool,
}

impl Default for LogSinkConfig {
    fn default() -> Self {
        Self {
            info_path: PathBuf::from("logs/info.log"),
            error_path: PathBuf::from("logs/error.log"),
            debug: false,
        }
    }
}

impl LogSinkConfig {
    /// Creates a config with explicit file paths.
    #[must_use]
    pub fn new(info_path: impl Into<PathBuf>, error_path: impl Into<PathBuf>) -> Self {
        Self {
            info_path: info_path.into(),
            error_path: error_path.into(),
            debug: false,
        }
    }

    /// Sets whether debug lines are written.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn same_paths(&self, other: &Self) -> bool {
        self.info_path == other.info_path && self.error_path == other.error_path
    }
}

/// Open files for the current configuration.
#[derive(Debug)]
struct FileState {
    config: LogSinkConfig,
    info: File,
    error: File,
}

/// Append-only file sink with guarded reconfiguration.
#[derive(Debug)]
pub struct FileSink {
    state: Mutex<FileState>,
}

impl FileSink {
    /// Opens (creating if needed) both log files.
    ///
    /// # Errors
    ///
    /// Returns an error if a file or its parent directory cannot be created.
    pub fn new(config: LogSinkConfig) -> Result<Self> {
        let state = Self::open(config)?;
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Applies a new configuration.
    ///
    /// Files are reopened only if a path changed; returns whether they were.
    /// The debug flag is always updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the new files cannot be opened. The previous
    /// files stay in use in that case.
    pub fn configure(&self, config: LogSinkConfig) -> Result<bool> {
        let mut state = self.state.lock();
        if state.config.same_paths(&config) {
            state.config.debug = config.debug;
            return Ok(false);
        }

        *state = Self::open(config)?;
        info!(
            info_path = %state.config.info_path.display(),
            error_path = %state.config.error_path.display(),
            "file sink reconfigured"
        );
        Ok(true)
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> LogSinkConfig {
        self.state.lock().config.clone()
    }

    fn open(config: LogSinkConfig) -> Result<FileState> {
        let info = open_append(&config.info_path)?;
        let error = open_append(&config.error_path)?;
        debug!(
            info_path = %config.info_path.display(),
            error_path = %config.error_path.display(),
            "opened log files"
        );
        Ok(FileState {
            config,
            info,
            error,
        })
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

impl LogSink for FileSink {
    fn write(&self, level: SinkLevel, line: &str) -> Result<()> {
        let mut state = self.state.lock();
        if level == SinkLevel::Debug && !state.config.debug {
            return Ok(());
        }

        let record = format!(
            "{} {:<8} {line}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level.as_str()
        );
        let file = if level.is_high() {
            &mut state.error
        } else {
            &mut state.info
        };
        file.write_all(record.as_bytes())?;
        Ok(())
    }
}

/// Routes lines into the host's `tracing` subscriber.
///
/// Low-channel lines use the [`LOW_TARGET`] target and high-channel lines
/// the [`HIGH_TARGET`] target, so they can be filtered independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: SinkLevel, line: &str) -> Result<()> {
        match level {
            SinkLevel::Debug => debug!(target: LOW_TARGET, "{line}"),
            SinkLevel::Info => info!(target: LOW_TARGET, "{line}"),
            SinkLevel::Warning => warn!(target: HIGH_TARGET, "{line}"),
            SinkLevel::Error => error!(target: HIGH_TARGET, critical = false, "{line}"),
            SinkLevel::Critical => error!(target: HIGH_TARGET, critical = true, "{line}"),
        }
        Ok(())
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(SinkLevel, String)>>,
}

impl MemorySink {
    /// Creates an empty memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded lines.
    #[must_use]
    pub fn lines(&self) -> Vec<(SinkLevel, String)> {
        self.lines.lock().clone()
    }

    /// Returns the recorded lines of the high channel.
    #[must_use]
    pub fn high_lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(level, _)| level.is_high())
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Removes all recorded lines.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn write(&self, level: SinkLevel, line: &str) -> Result<()> {
        self.lines.lock().push((level, line.to_string()));
        Ok(())
    }
}

/// Writes each line to several sinks.
#[derive(Debug, Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn LogSink>>,
}

impl MultiSink {
    /// Creates an empty fan-out sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    #[must_use]
    pub fn with(mut self, sink: impl LogSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Returns the number of sinks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns true if there are no sinks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl LogSink for MultiSink {
    /// Writes to every sink, then returns the first error.
    fn write(&self, level: SinkLevel, line: &str) -> Result<()> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(err) = sink.write(level, line) {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
