use autosel_common::tolerance::Tolerance;

use super::logger::{LogLevel, LoggerConfig};

/// Configuration of the autotuning pass: verbosity, effort level, output
/// verification tolerances and winner cache location.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct AutotuneConfig {
    /// Logger attached to autotune events.
    #[serde(default)]
    pub logger: LoggerConfig<AutotuneLogLevel>,
    /// How much benchmarking effort to spend.
    #[serde(default)]
    pub level: AutotuneLevel,
    /// Tolerances applied when verifying a candidate against the reference.
    #[serde(default)]
    pub verify: Tolerance,
    /// Where the persistent winner cache lives.
    #[cfg(feature = "autotune-cache")]
    #[serde(default)]
    pub cache: AutotuneCache,
}

/// Location of the persistent winner cache.
#[cfg(feature = "autotune-cache")]
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum AutotuneCache {
    /// In the current directory.
    Local,
    /// In the user cache directory.
    #[default]
    Global,
    /// At the provided path.
    File(std::path::PathBuf),
}

/// Verbosity of autotune logging.
#[derive(Default, Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub enum AutotuneLogLevel {
    /// No autotune logging.
    #[serde(rename = "disabled")]
    Disabled,
    /// Only log selected winners.
    #[default]
    #[serde(rename = "minimal")]
    Minimal,
    /// Log winners, disqualifications and timings.
    #[serde(rename = "full")]
    Full,
}

impl LogLevel for AutotuneLogLevel {}

/// How much effort the tuner spends before selecting a winner.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AutotuneLevel {
    /// Skip benchmarking and pick the first candidate.
    #[serde(rename = "minimal")]
    Minimal,
    /// Benchmark with the default number of samples.
    #[default]
    #[serde(rename = "balanced")]
    Balanced,
    /// Benchmark with more samples for noisy workloads.
    #[serde(rename = "full")]
    Full,
}

impl AutotuneLevel {
    /// Number of timed samples per candidate at this level.
    pub fn num_samples(&self) -> usize {
        match self {
            AutotuneLevel::Minimal => 0,
            AutotuneLevel::Balanced => 10,
            AutotuneLevel::Full => 25,
        }
    }
}

#[cfg(feature = "autotune-cache")]
impl AutotuneCache {
    /// Root directory of the persistent cache.
    pub fn root(&self) -> std::path::PathBuf {
        match self {
            AutotuneCache::Local => std::env::current_dir()
                .unwrap_or_else(|_| std::path::PathBuf::from("."))
                .join(".autosel"),
            AutotuneCache::Global => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("autosel"),
            AutotuneCache::File(path_buf) => path_buf.clone(),
        }
    }
}
