/// Anchor a dimension to the next power of two, optionally clamped.
///
/// Useful when creating autotune keys: nearby sizes share a key instead of
/// each triggering their own benchmarking pass.
pub fn anchor(x: usize, max: Option<usize>) -> usize {
    let power = x.max(1).next_power_of_two();
    match max {
        Some(max) => core::cmp::min(power, max),
        None => power,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_rounds_up() {
        assert_eq!(anchor(1, None), 1);
        assert_eq!(anchor(33, None), 64);
        assert_eq!(anchor(64, None), 64);
    }

    #[test]
    fn test_anchor_clamps() {
        assert_eq!(anchor(5000, Some(1024)), 1024);
    }

    #[test]
    fn test_anchor_zero() {
        assert_eq!(anchor(0, None), 1);
    }
}
