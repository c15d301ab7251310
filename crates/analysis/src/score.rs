//! Documented ranges for the numeric scores carried by a chapter analysis.
//! Upstream analysis is noisy, so out-of-range values are pulled back to the
//! nearest bound instead of being rejected.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

pub const RELEVANCE: ScoreRange = ScoreRange { min: 0.0, max: 1.0 };
pub const SENTIMENT: ScoreRange = ScoreRange { min: -1.0, max: 1.0 };
pub const MAGNITUDE: ScoreRange = ScoreRange { min: 0.0, max: 1.0 };
pub const READABILITY: ScoreRange = ScoreRange { min: 0.0, max: 100.0 };
pub const ENGAGEMENT: ScoreRange = ScoreRange { min: 0.0, max: 10.0 };

impl ScoreRange {
    /// NaN has no nearest bound; it collapses to the lower one. Negative
    /// zero comes back as `0.0` so equal scores also compare equal under
    /// `total_cmp`.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max) + 0.0
    }
}

/// Map a relationship sentiment label to a score.
pub fn sentiment_from_label(label: &str) -> f64 {
    match label.trim().to_lowercase().as_str() {
        "positive" | "friendly" | "warm" => 1.0,
        "negative" | "hostile" | "antagonistic" => -1.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_nearest_bound() {
        assert_eq!(RELEVANCE.clamp(1.4), 1.0);
        assert_eq!(RELEVANCE.clamp(-0.2), 0.0);
        assert_eq!(SENTIMENT.clamp(-2.0), -1.0);
        assert_eq!(SENTIMENT.clamp(0.25), 0.25);
        assert_eq!(READABILITY.clamp(140.0), 100.0);
        assert_eq!(ENGAGEMENT.clamp(7.5), 7.5);
    }

    #[test]
    fn test_nan_collapses_to_min() {
        assert_eq!(SENTIMENT.clamp(f64::NAN), -1.0);
        assert_eq!(RELEVANCE.clamp(f64::NAN), 0.0);
    }

    #[test]
    fn test_negative_zero_normalised() {
        let clamped = RELEVANCE.clamp(-0.0);
        assert!(clamped.is_sign_positive());
        assert_eq!(clamped.total_cmp(&0.0), std::cmp::Ordering::Equal);
        assert!(SENTIMENT.clamp(-0.0).is_sign_positive());
    }

    #[test]
    fn test_sentiment_labels() {
        assert_eq!(sentiment_from_label("Positive"), 1.0);
        assert_eq!(sentiment_from_label(" negative "), -1.0);
        assert_eq!(sentiment_from_label("Mixed"), 0.0);
    }
}
