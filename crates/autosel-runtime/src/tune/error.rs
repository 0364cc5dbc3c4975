use autosel_common::tolerance::ToleranceError;
use core::fmt::Display;

/// An error raised by one autotune choice.
///
/// If other choices succeeded, the failing choice is excluded and selection
/// continues gracefully; the error only surfaces when no choice survives.
#[derive(Debug, Clone, PartialEq)]
pub enum AutotuneError {
    /// The choice cannot handle the given inputs (element type, layout).
    Unsupported(String),
    /// The choice produced an output outside the verification tolerance.
    OutOfTolerance(ToleranceError),
    /// No choice survived benchmarking and verification.
    NoValidChoice(String),
    /// Uncategorized failure.
    Unknown(String),
}

impl Display for AutotuneError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AutotuneError::Unsupported(msg) => write!(f, "unsupported choice: {msg}"),
            AutotuneError::OutOfTolerance(err) => write!(f, "verification failed: {err}"),
            AutotuneError::NoValidChoice(msg) => write!(f, "no valid choice: {msg}"),
            AutotuneError::Unknown(msg) => write!(f, "{msg}"),
        }
    }
}

impl core::error::Error for AutotuneError {}

impl From<String> for AutotuneError {
    fn from(value: String) -> Self {
        Self::Unknown(value)
    }
}

impl From<&str> for AutotuneError {
    fn from(value: &str) -> Self {
        Self::Unknown(value.to_string())
    }
}

impl From<ToleranceError> for AutotuneError {
    fn from(value: ToleranceError) -> Self {
        Self::OutOfTolerance(value)
    }
}
