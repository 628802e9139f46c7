//! Score normalization
//!
//! Models answer on whatever scale they like (0-100, 0-10, occasionally 0-5).
//! Everything stored downstream uses 0-100 for the overall and component
//! scores and 0-10 for confidence.

/// Target scale for overall and component scores
pub const SCORE_SCALE: u8 = 100;

/// Target scale for confidence
pub const CONFIDENCE_SCALE: u8 = 10;

/// Normalize `value` onto `[0, target]`
///
/// - already within `[0, target]`: rounded
/// - within `[0, 10]` with target 100: multiplied by 10
/// - within `[0, 5]` with target 100: multiplied by 20
/// - anything else: clamped to `[0, target]`
///
/// Non-finite input maps to 0 (NaN) or the nearest bound (infinities).
/// Idempotent: `normalize(normalize(v, t) as f64, t) == normalize(v, t)`.
pub fn normalize(value: f64, target: u8) -> u8 {
    if value.is_nan() {
        return 0;
    }
    let max = f64::from(target);

    let scaled = if (0.0..=max).contains(&value) {
        value
    } else if target == SCORE_SCALE && (0.0..=10.0).contains(&value) {
        value * 10.0
    } else if target == SCORE_SCALE && (0.0..=5.0).contains(&value) {
        value * 20.0
    } else {
        value.clamp(0.0, max)
    };

    scaled.round().clamp(0.0, max) as u8
}

/// Normalize a value the model reported on an explicit `source_scale`
///
/// A 10-point answer of 8.5 becomes 85 on the 100 scale; a 5-point answer
/// of 4 becomes 80. Equal scales fall through to [`normalize`].
pub fn normalize_from_scale(value: f64, source_scale: u8, target: u8) -> u8 {
    if source_scale == 0 || source_scale == target || value.is_nan() {
        return normalize(value, target);
    }
    let factor = f64::from(target) / f64::from(source_scale);
    normalize(value * factor, target)
}

/// Guess the scale a set of 100-target scores was reported on
///
/// An explicit scale wins. Otherwise, when every score is at most 10 and at
/// least one is positive, the model is assumed to have answered out of 10.
pub fn detect_scale(scores: &[f64], explicit: Option<f64>) -> u8 {
    if let Some(scale) = explicit {
        if scale == 5.0 || scale == 10.0 || scale == 100.0 {
            return scale as u8;
        }
    }

    let finite: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    if finite.is_empty() {
        return SCORE_SCALE;
    }
    let all_small = finite.iter().all(|s| (0.0..=10.0).contains(s));
    let any_positive = finite.iter().any(|s| *s > 0.0);
    if all_small && any_positive {
        10
    } else {
        SCORE_SCALE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_values_are_rounded() {
        assert_eq!(normalize(85.0, 100), 85);
        assert_eq!(normalize(84.5, 100), 85);
        assert_eq!(normalize(7.4, 10), 7);
        assert_eq!(normalize(0.0, 100), 0);
    }

    #[test]
    fn test_ten_point_scale_matches_round_times_ten() {
        for tenth in 0..=100 {
            let s = f64::from(tenth) / 10.0;
            assert_eq!(
                normalize_from_scale(s, 10, 100),
                (s * 10.0).round() as u8,
                "value {}",
                s
            );
        }
    }

    #[test]
    fn test_hundred_point_matches_round() {
        for whole in 0..=100 {
            let s = f64::from(whole) + 0.3;
            let expected = s.round().min(100.0) as u8;
            assert_eq!(normalize(s, 100), expected);
        }
    }

    #[test]
    fn test_five_point_scale() {
        assert_eq!(normalize_from_scale(4.0, 5, 100), 80);
        assert_eq!(normalize_from_scale(2.5, 5, 100), 50);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        assert_eq!(normalize(150.0, 100), 100);
        assert_eq!(normalize(-3.0, 100), 0);
        assert_eq!(normalize(12.0, 10), 10);
        assert_eq!(normalize(f64::INFINITY, 100), 100);
        assert_eq!(normalize(f64::NEG_INFINITY, 10), 0);
        assert_eq!(normalize(f64::NAN, 100), 0);
    }

    #[test]
    fn test_idempotent() {
        for raw in [-20.0, 0.0, 3.3, 9.99, 10.0, 55.5, 100.0, 250.0] {
            for target in [10u8, 100u8] {
                let once = normalize(raw, target);
                assert_eq!(normalize(f64::from(once), target), once);
            }
        }
        let once = normalize_from_scale(7.5, 10, 100);
        assert_eq!(normalize(f64::from(once), 100), once);
    }

    #[test]
    fn test_detect_scale() {
        assert_eq!(detect_scale(&[8.0, 7.5, 9.0], None), 10);
        assert_eq!(detect_scale(&[80.0, 7.5, 9.0], None), 100);
        assert_eq!(detect_scale(&[0.0, 0.0], None), 100);
        assert_eq!(detect_scale(&[4.0, 3.0], Some(5.0)), 5);
        assert_eq!(detect_scale(&[], None), 100);
    }
}
