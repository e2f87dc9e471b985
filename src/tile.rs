//! # Tile Data
//! The common shape every tile renders, whatever source fed it.
//!
//! Invariant: `metrics` is never empty once a payload has passed through the
//! normalizer, so consumers never branch on "metrics missing".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::query::{QueryContext, SortOrder};

/// Which fetch/normalize strategy a tile-type string selects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TileKind {
    PmfScore,
    Reddit,
    YouTube,
    News,
    WebSearch,
    /// Blended multi-source sentiment produced by the aggregator.
    Sentiment,
    /// Unknown tile types fall back to a generic pass-through mapping.
    Other(String),
}

impl TileKind {
    pub fn parse(tile_type: &str) -> Self {
        match tile_type.trim().to_ascii_lowercase().as_str() {
            "pmf_score" | "pmf" => TileKind::PmfScore,
            "reddit" => TileKind::Reddit,
            "youtube" => TileKind::YouTube,
            "news" | "gdelt" => TileKind::News,
            "web_search" | "search" => TileKind::WebSearch,
            "sentiment" | "unified_sentiment" => TileKind::Sentiment,
            other => TileKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TileKind::PmfScore => "pmf_score",
            TileKind::Reddit => "reddit",
            TileKind::YouTube => "youtube",
            TileKind::News => "news",
            TileKind::WebSearch => "web_search",
            TileKind::Sentiment => "sentiment",
            TileKind::Other(s) => s.as_str(),
        }
    }
}

/// Percentages, nominally summing to 100 (rounding may leave 99..=101).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentiment {
    pub positive: u32,
    pub neutral: u32,
    pub negative: u32,
}

impl Sentiment {
    pub const fn new(positive: u32, neutral: u32, negative: u32) -> Self {
        Self {
            positive,
            neutral,
            negative,
        }
    }

    pub fn total(&self) -> u32 {
        self.positive + self.neutral + self.negative
    }

    /// Label of the largest component; ties resolve positive > neutral > negative.
    pub fn dominant(&self) -> &'static str {
        if self.positive >= self.neutral && self.positive >= self.negative {
            "positive"
        } else if self.neutral >= self.negative {
            "neutral"
        } else {
            "negative"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: None,
            confidence: None,
            explanation: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn confidence(mut self, c: f64) -> Self {
        self.confidence = Some(c.clamp(0.0, 1.0));
        self
    }

    pub fn explanation(mut self, text: impl Into<String>) -> Self {
        self.explanation = Some(text.into());
        self
    }

    /// Placeholder used whenever a mapping produced no metrics at all.
    pub fn placeholder() -> Self {
        Self::new("Signal", "N/A").explanation("No data returned for this query yet")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileItem {
    pub title: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTileData {
    pub updated_at: DateTime<Utc>,
    pub filters: QueryContext,
    pub metrics: Vec<Metric>,
    pub items: Vec<TileItem>,
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for NormalizedTileData {
    fn default() -> Self {
        Self {
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            filters: QueryContext::default(),
            metrics: Vec::new(),
            items: Vec::new(),
            insights: Vec::new(),
            sentiment: None,
            citations: Vec::new(),
            error: None,
        }
    }
}

impl NormalizedTileData {
    /// Enforce the non-empty metrics invariant.
    pub fn ensure_metrics(mut self) -> Self {
        if self.metrics.is_empty() {
            self.metrics.push(Metric::placeholder());
        }
        self
    }

    pub fn with_filters(mut self, ctx: &QueryContext) -> Self {
        self.filters = ctx.clone();
        self
    }

    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }

    /// Append insights that are not already present, keeping first-seen order.
    pub fn merge_insights<I: IntoIterator<Item = String>>(&mut self, extra: I) -> usize {
        let mut added = 0;
        for s in extra {
            if !s.is_empty() && !self.insights.iter().any(|i| i.eq_ignore_ascii_case(&s)) {
                self.insights.push(s);
                added += 1;
            }
        }
        added
    }

    /// Relevance keeps upstream order; recency puts newest first and undated last.
    pub fn sort_items(&mut self, order: SortOrder) {
        if order == SortOrder::Recency {
            // stable: equal/undated items keep their upstream order
            self.items
                .sort_by(|a, b| match (a.published, b.published) {
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(title: &str, ts: Option<i64>) -> TileItem {
        TileItem {
            title: title.into(),
            snippet: String::new(),
            url: None,
            source: None,
            published: ts.and_then(|t| Utc.timestamp_opt(t, 0).single()),
        }
    }

    #[test]
    fn recency_sort_is_newest_first_with_undated_last() {
        let mut d = NormalizedTileData {
            items: vec![item("a", Some(10)), item("b", None), item("c", Some(30))],
            ..Default::default()
        };
        d.sort_items(SortOrder::Relevance);
        assert_eq!(d.items[0].title, "a");
        d.sort_items(SortOrder::Recency);
        let titles: Vec<_> = d.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["c", "a", "b"]);
    }

    #[test]
    fn merge_insights_skips_duplicates() {
        let mut d = NormalizedTileData {
            insights: vec!["Demand is growing".into()],
            ..Default::default()
        };
        let added = d.merge_insights(vec![
            "demand is growing".to_string(),
            "Pricing is a concern".to_string(),
        ]);
        assert_eq!(added, 1);
        assert_eq!(d.insights.len(), 2);
    }

    #[test]
    fn tile_kind_round_trips_known_names() {
        for name in ["pmf_score", "reddit", "youtube", "news", "web_search", "sentiment"] {
            assert_eq!(TileKind::parse(name).as_str(), name);
        }
        assert_eq!(TileKind::parse("competitors"), TileKind::Other("competitors".into()));
    }

    #[test]
    fn serialized_shape_omits_absent_error() {
        let v = serde_json::to_value(NormalizedTileData::default().ensure_metrics()).unwrap();
        assert!(v.get("error").is_none());
        assert!(v["updatedAt"].is_string());
        assert_eq!(v["metrics"][0]["name"], "Signal");
    }
}
