//! Derived metric computation for parsed statistics.
//!
//! All division operations are safe against zero denominators and produce
//! `None` (rendered as JSON `null`) rather than NaN / Infinity.

/// Safe division returning `None` when the denominator is zero.
pub fn safe_div(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        None
    } else {
        Some(numerator / denominator)
    }
}

/// Weighted mean over `(value, weight)` pairs.
///
/// Pairs without a value are ignored, and so is their weight. `None` when no
/// pair contributes a non-zero weight.
pub fn weighted_average(pairs: impl IntoIterator<Item = (Option<f64>, f64)>) -> Option<f64> {
    let (sum, weights) = pairs
        .into_iter()
        .filter_map(|(value, weight)| value.map(|v| (v * weight, weight)))
        .fold((0.0, 0.0), |(s, w), (vw, weight)| (s + vw, w + weight));
    safe_div(sum, weights)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_div_zero_denominator() {
        assert_eq!(safe_div(100.0, 0.0), None);
        assert_eq!(safe_div(10.0, 4.0), Some(2.5));
    }

    #[test]
    fn weighted_average_skips_missing_values() {
        let avg = weighted_average([(Some(80.0), 2.0), (None, 5.0), (Some(50.0), 1.0)]);
        assert_eq!(avg, Some(70.0));
        assert_eq!(weighted_average([(None, 1.0)]), None);
        assert_eq!(weighted_average([(Some(3.0), 0.0)]), None);
    }
}
