use core::fmt::Display;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Absolute and relative tolerance for approximate numerical comparison.
///
/// A value passes when `|actual - expected| <= atol + rtol * |expected|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    /// Absolute tolerance.
    pub atol: f64,
    /// Relative tolerance.
    pub rtol: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            atol: 1e-4,
            rtol: 1e-4,
        }
    }
}

impl Tolerance {
    /// Create a tolerance from absolute and relative bounds.
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self { atol, rtol }
    }

    /// A tolerance that only accepts exact matches, for integer outputs.
    pub const fn exact() -> Self {
        Self {
            atol: 0.0,
            rtol: 0.0,
        }
    }

    /// Whether `actual` is within tolerance of `expected`.
    pub fn contains(&self, expected: f64, actual: f64) -> bool {
        if expected.is_nan() {
            return actual.is_nan();
        }
        (actual - expected).abs() <= self.atol + self.rtol * expected.abs()
    }
}

/// The worst offending element of a failed comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceError {
    /// Flat index of the element.
    pub index: usize,
    /// Expected value.
    pub expected: f64,
    /// Actual value.
    pub actual: f64,
}

impl Display for ToleranceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "value {} at index {} outside tolerance of expected {}",
            self.actual, self.index, self.expected
        )
    }
}

impl core::error::Error for ToleranceError {}

/// Compare two slices element-wise within the given tolerance.
///
/// Both slices must have the same length. On failure, reports the element
/// with the largest absolute error.
pub fn compare_approx<E: ToPrimitive + Copy>(
    expected: &[E],
    actual: &[E],
    tolerance: Tolerance,
) -> Result<(), ToleranceError> {
    assert_eq!(
        expected.len(),
        actual.len(),
        "approximate comparison requires slices of equal length"
    );

    let mut worst: Option<(usize, f64, f64, f64)> = None;

    for (index, (e, a)) in expected.iter().zip(actual.iter()).enumerate() {
        let e = e.to_f64().unwrap_or(f64::NAN);
        let a = a.to_f64().unwrap_or(f64::NAN);

        if tolerance.contains(e, a) {
            continue;
        }

        let abs_err = if a.is_nan() || e.is_nan() {
            f64::INFINITY
        } else {
            (a - e).abs()
        };
        match worst {
            Some((_, _, _, prev)) if prev >= abs_err => {}
            _ => worst = Some((index, e, a, abs_err)),
        }
    }

    match worst {
        None => Ok(()),
        Some((index, expected, actual, _)) => Err(ToleranceError {
            index,
            expected,
            actual,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_tolerance() {
        let tolerance = Tolerance::new(1e-4, 1e-4);
        assert!(compare_approx(&[1.0f32, 2.0], &[1.00005, 2.0001], tolerance).is_ok());
    }

    #[test]
    fn test_reports_worst_offender() {
        let tolerance = Tolerance::new(1e-4, 1e-4);
        let err = compare_approx(&[1.0f32, 2.0, 3.0], &[1.01, 2.5, 3.0], tolerance).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_exact_integers() {
        assert!(compare_approx(&[1i32, 2, 3], &[1, 2, 3], Tolerance::exact()).is_ok());
        assert!(compare_approx(&[1i32, 2, 3], &[1, 2, 4], Tolerance::exact()).is_err());
    }

    #[test]
    fn test_nan_matches_nan() {
        let tolerance = Tolerance::default();
        assert!(compare_approx(&[f32::NAN], &[f32::NAN], tolerance).is_ok());
        assert!(compare_approx(&[f32::NAN], &[1.0], tolerance).is_err());
    }
}
