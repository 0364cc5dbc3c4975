use super::GlobalConfig;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for logging one engine concern, parameterized by a log
/// level type.
///
/// Note that multiple sinks can be active at the same time.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(bound = "")]
pub struct LoggerConfig<L: LogLevel> {
    /// Path to the log file, if file logging is enabled.
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Whether to append to the log file (true) or overwrite it (false).
    /// Defaults to true.
    #[serde(default = "append_default")]
    pub append: bool,

    /// Whether to log to standard output.
    #[serde(default)]
    pub stdout: bool,

    /// Whether to log to standard error.
    #[serde(default)]
    pub stderr: bool,

    /// Optional crate-level logging (e.g. info, debug, trace).
    #[serde(default)]
    pub log: Option<LogCrateLevel>,

    /// The log level for this concern, determining verbosity.
    #[serde(default)]
    pub level: L,
}

impl<L: LogLevel> Default for LoggerConfig<L> {
    fn default() -> Self {
        Self {
            file: None,
            append: true,
            stdout: false,
            stderr: false,
            log: Some(LogCrateLevel::Info),
            level: L::default(),
        }
    }
}

/// Log levels using the `log` crate.
#[derive(
    Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize, Hash, PartialEq, Eq,
)]
pub enum LogCrateLevel {
    /// Logs informational messages.
    #[default]
    #[serde(rename = "info")]
    Info,
    /// Logs debugging messages.
    #[serde(rename = "debug")]
    Debug,
    /// Logs trace-level messages.
    #[serde(rename = "trace")]
    Trace,
}

fn append_default() -> bool {
    true
}

/// Trait for types that can be used as log levels in [`LoggerConfig`].
pub trait LogLevel:
    serde::de::DeserializeOwned + serde::Serialize + Clone + Copy + core::fmt::Debug + Default
{
}

/// Central logging utility, fanning one message out to every configured sink.
#[derive(Debug)]
pub struct Logger {
    sinks: Vec<LoggerKind>,
    /// Global configuration the sinks were built from.
    pub config: Arc<GlobalConfig>,
}

#[derive(Debug)]
enum LoggerKind {
    File(BufWriter<File>),
    Stdout,
    Stderr,
    LogCrate(LogCrateLevel),
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a new `Logger` based on the global configuration.
    ///
    /// Note that creating a logger is quite expensive; keep it alive rather
    /// than recreating it per message.
    pub fn new() -> Self {
        let config = GlobalConfig::get();
        let settings = &config.autotune.logger;
        let mut sinks = Vec::new();

        if let Some(path) = &settings.file {
            match open_log_file(path, settings.append) {
                Ok(file) => sinks.push(LoggerKind::File(BufWriter::new(file))),
                Err(err) => log::warn!("Unable to open log file '{}': {err}", path.display()),
            }
        }
        if settings.stdout {
            sinks.push(LoggerKind::Stdout);
        }
        if settings.stderr {
            sinks.push(LoggerKind::Stderr);
        }
        if let Some(level) = settings.log {
            sinks.push(LoggerKind::LogCrate(level));
        }

        Self { sinks, config }
    }

    /// Log a message related to autotuning.
    pub fn log_autotune<S: Display>(&mut self, message: S) {
        let message = message.to_string();

        for sink in self.sinks.iter_mut() {
            match sink {
                LoggerKind::File(writer) => {
                    let _ = writeln!(writer, "{message}");
                    let _ = writer.flush();
                }
                LoggerKind::Stdout => println!("{message}"),
                LoggerKind::Stderr => eprintln!("{message}"),
                LoggerKind::LogCrate(level) => match level {
                    LogCrateLevel::Info => log::info!("{message}"),
                    LogCrateLevel::Debug => log::debug!("{message}"),
                    LogCrateLevel::Trace => log::trace!("{message}"),
                },
            }
        }
    }
}

fn open_log_file(path: &PathBuf, append: bool) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    OpenOptions::new()
        .write(true)
        .append(append)
        .truncate(!append)
        .create(true)
        .open(path)
}
