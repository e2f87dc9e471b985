//! Sentiment breakdown helpers shared by the normalizer and the aggregator.
//!
//! All functions here are pure and deterministic.

use crate::tile::Sentiment;

/// Fixed PMF lookup: (min score, breakdown, explanation). First match wins.
const PMF_TABLE: [(i64, Sentiment, &str); 3] = [
    (70, Sentiment::new(85, 10, 5), "Strong PMF"),
    (40, Sentiment::new(60, 30, 10), "Moderate PMF"),
    (i64::MIN, Sentiment::new(30, 40, 30), "Weak PMF"),
];

/// Breakdown and explanation for a PMF score (already rounded to an integer).
pub fn pmf_breakdown(score: i64) -> (Sentiment, &'static str) {
    for (min, s, label) in PMF_TABLE {
        if score >= min {
            return (s, label);
        }
    }
    // unreachable: the last row matches everything
    (PMF_TABLE[2].1, PMF_TABLE[2].2)
}

/// Turn raw counts (or percentages) into integer percentages.
/// Each component is rounded independently, so sums of 99..=101 are accepted.
/// Returns `None` when there is nothing to distribute.
pub fn percentages(positive: f64, neutral: f64, negative: f64) -> Option<Sentiment> {
    let p = positive.max(0.0);
    let n = neutral.max(0.0);
    let g = negative.max(0.0);
    let total = p + n + g;
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let pct = |x: f64| (x / total * 100.0).round() as u32;
    Some(Sentiment::new(pct(p), pct(n), pct(g)))
}

/// Map a scalar score to a positive share in `[0, 1]`.
/// Scores in `[-1, 1]` are treated as polarity, larger ones as a 0..100 scale.
pub fn positive_share(score: f64) -> f64 {
    if !score.is_finite() {
        return 0.5;
    }
    if (-1.0..=1.0).contains(&score) {
        (score + 1.0) / 2.0
    } else {
        (score / 100.0).clamp(0.0, 1.0)
    }
}

/// Neutral-weighted placeholder: neutral always holds half, the scalar
/// decides how the other half splits. No score yields {25, 50, 25}.
pub fn placeholder(score: Option<f64>) -> Sentiment {
    let p = score.map(positive_share).unwrap_or(0.5);
    let positive = (50.0 * p).round() as u32;
    Sentiment::new(positive, 50, 50 - positive.min(50))
}

/// Coarse polarity of a single mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Neutral,
    Negative,
}

impl Polarity {
    /// Parse labels like "positive", "NEG", "bullish".
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" | "bullish" | "good" => Some(Polarity::Positive),
            "neutral" | "neu" | "mixed" => Some(Polarity::Neutral),
            "negative" | "neg" | "bearish" | "bad" => Some(Polarity::Negative),
            _ => None,
        }
    }

    /// Classify a numeric score: polarity in [-1,1], or a wider symmetric
    /// scale such as GDELT tone. A dead band around zero counts as neutral.
    pub fn from_score(score: f64) -> Self {
        let band = if score.abs() <= 1.0 { 0.1 } else { 1.0 };
        if score > band {
            Polarity::Positive
        } else if score < -band {
            Polarity::Negative
        } else {
            Polarity::Neutral
        }
    }
}
