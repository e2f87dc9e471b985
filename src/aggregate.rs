//! # Aggregator
//! Blends per-source results into one sentiment picture for an idea.
//!
//! - `None` entries (failed sources) are skipped silently; partial failure is
//!   not an error.
//! - One cluster per source with volume > 0; zero-volume sources are dropped.
//! - Overall distribution is the plain arithmetic mean of cluster
//!   percentages (every contributing source counts equally, regardless of
//!   volume or engagement).
//! - Confidence grows with source diversity and volume, capped at 0.95.
//!
//! Pure and deterministic: same inputs, same output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::normalize::breakdown::{self, Polarity};
use crate::normalize::clean_text;
use crate::normalize::shapes::{
    self, AsMention, Common, NewsPayload, Payload, RedditPayload, SerpPayload, TwitterPayload,
    Volume, YouTubePayload,
};
use crate::source::SourceName;
use crate::tile::{Citation, Metric, NormalizedTileData, Sentiment, TileItem};

/// Results of a fan-out: `None` means the source failed or timed out.
pub type SourceResults = BTreeMap<SourceName, Option<Value>>;

const MAX_QUOTES: usize = 3;
const MAX_CITATIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub source: String,
    pub theme: String,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub insight: String,
    #[serde(default)]
    pub quotes: Vec<Quote>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub volume: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedMetrics {
    #[serde(default)]
    pub overall_distribution: Sentiment,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub total_mentions: u64,
    #[serde(default)]
    pub source_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedSentiment {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub metrics: UnifiedMetrics,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

/// `min(0.95, 0.3 + 0.15 * clusters + min(mentions, 200) / 400)`
pub fn confidence(cluster_count: usize, total_mentions: u64) -> f64 {
    let volume = total_mentions.min(200) as f64 / 400.0;
    (0.3 + 0.15 * cluster_count as f64 + volume).min(0.95)
}

/// Merge per-source results. Never fails; all-`None` yields an empty,
/// zero-volume result with a "limited data" summary.
pub fn aggregate(idea_text: &str, results: &SourceResults) -> UnifiedSentiment {
    let mut clusters = Vec::new();
    for (source, raw) in results {
        let Some(raw) = raw else {
            debug!(target: "aggregate", %source, "source unavailable, skipped");
            continue;
        };
        match build_cluster(*source, raw) {
            Some(c) => clusters.push(c),
            None => debug!(target: "aggregate", %source, "zero volume, discarded"),
        }
    }

    let total_mentions: u64 = clusters.iter().map(|c| c.volume).sum();
    let overall = mean_distribution(&clusters);
    let metrics = UnifiedMetrics {
        overall_distribution: overall,
        confidence: confidence(clusters.len(), total_mentions),
        total_mentions,
        source_count: clusters.len(),
    };

    UnifiedSentiment {
        summary: summarize(idea_text, &clusters, &metrics),
        metrics,
        clusters,
    }
}

fn mean_distribution(clusters: &[Cluster]) -> Sentiment {
    if clusters.is_empty() {
        return Sentiment::default();
    }
    let n = clusters.len() as f64;
    let mean = |f: fn(&Sentiment) -> u32| {
        (clusters.iter().map(|c| f(&c.sentiment) as f64).sum::<f64>() / n).round() as u32
    };
    Sentiment::new(
        mean(|s: &Sentiment| s.positive),
        mean(|s: &Sentiment| s.neutral),
        mean(|s: &Sentiment| s.negative),
    )
}

fn summarize(idea_text: &str, clusters: &[Cluster], m: &UnifiedMetrics) -> String {
    let idea = idea_text.trim();
    if clusters.is_empty() {
        return format!(
            "Limited data available for \"{idea}\": no source returned usable discussion yet."
        );
    }
    let o = m.overall_distribution;
    format!(
        "Across {} source(s) and {} mention(s), sentiment toward \"{idea}\" is mostly {} ({}% positive, {}% neutral, {}% negative).",
        clusters.len(),
        m.total_mentions,
        o.dominant(),
        o.positive,
        o.neutral,
        o.negative
    )
}

// ------------------------------------------------------------
// Per-source signal extraction
// ------------------------------------------------------------

struct Mention {
    text: String,
    title: String,
    url: Option<String>,
    polarity: Option<Polarity>,
}

fn to_mentions<T: AsMention>(entries: Vec<T>) -> Vec<Mention> {
    entries
        .iter()
        .map(|m| Mention {
            text: m.body().unwrap_or_default(),
            title: m.heading().unwrap_or_default(),
            url: m.link(),
            polarity: m.tone().polarity(),
        })
        .collect()
}

/// Located layer plus the mentions listed in it, read through the source's shape.
fn read_mentions(source: SourceName, raw: &Value) -> (Vec<Mention>, &Value) {
    fn typed<T: Payload>(raw: &Value, entries: impl FnOnce(T) -> Vec<Mention>) -> (Vec<Mention>, &Value) {
        let (payload, v) = shapes::read::<T>(raw);
        (entries(payload), v)
    }
    match source {
        SourceName::Reddit => typed(raw, |p: RedditPayload| to_mentions(p.entries())),
        SourceName::Twitter => typed(raw, |p: TwitterPayload| to_mentions(p.entries())),
        SourceName::YouTube => typed(raw, |p: YouTubePayload| to_mentions(p.entries())),
        SourceName::News => typed(raw, |p: NewsPayload| to_mentions(p.entries())),
        SourceName::WebSearch | SourceName::Llm => {
            typed(raw, |p: SerpPayload| to_mentions(p.entries()))
        }
    }
}

fn build_cluster(source: SourceName, raw: &Value) -> Option<Cluster> {
    let (mentions, v) = read_mentions(source, raw);

    let declared = shapes::parse::<Volume>(v).declared();
    let volume = declared.max(mentions.len() as u64);
    if volume == 0 {
        return None;
    }

    let sentiment = shapes::parse::<Common>(v)
        .breakdown()
        .unwrap_or_else(|| count_polarities(&mentions));
    let name = source.display_name();

    let quotes = mentions
        .iter()
        .filter(|m| !m.text.is_empty())
        .take(MAX_QUOTES)
        .map(|m| Quote {
            text: clean_text(&m.text),
            url: m.url.clone(),
        })
        .collect();

    let citations = mentions
        .iter()
        .filter_map(|m| {
            Some(Citation {
                source: name.to_string(),
                url: m.url.clone()?,
                title: if m.title.is_empty() { m.text.clone() } else { m.title.clone() },
            })
        })
        .take(MAX_CITATIONS)
        .collect();

    Some(Cluster {
        source: source.as_str().to_string(),
        theme: format!("{name} discussion"),
        insight: format!(
            "{name}: mostly {} across {volume} mention(s) ({}% positive, {}% negative).",
            sentiment.dominant(),
            sentiment.positive,
            sentiment.negative
        ),
        sentiment,
        quotes,
        citations,
        volume,
    })
}

/// Unlabeled mentions count as neutral.
fn count_polarities(mentions: &[Mention]) -> Sentiment {
    let (mut p, mut n, mut g) = (0.0, 0.0, 0.0);
    for m in mentions {
        match m.polarity {
            Some(Polarity::Positive) => p += 1.0,
            Some(Polarity::Negative) => g += 1.0,
            Some(Polarity::Neutral) | None => n += 1.0,
        }
    }
    // declared volume without listed mentions: nothing to classify
    breakdown::percentages(p, n, g).unwrap_or(Sentiment::new(0, 100, 0))
}

// ------------------------------------------------------------
// Tile mapping
// ------------------------------------------------------------

impl UnifiedSentiment {
    /// Render the blended result as a tile payload.
    pub fn into_tile(self) -> NormalizedTileData {
        let m = &self.metrics;
        let o = m.overall_distribution;
        let metrics = vec![
            Metric::new("Overall Sentiment", format!("{}% positive", o.positive))
                .confidence(m.confidence)
                .explanation(format!(
                    "{}% neutral, {}% negative (mean across sources)",
                    o.neutral, o.negative
                )),
            Metric::new("Confidence", format!("{:.0}%", m.confidence * 100.0)),
            Metric::new("Mentions", m.total_mentions.to_string()),
            Metric::new("Sources", m.source_count.to_string()),
        ];

        let mut items = Vec::new();
        let mut citations: Vec<Citation> = Vec::new();
        let mut insights = Vec::new();
        if !self.summary.is_empty() {
            insights.push(self.summary.clone());
        }
        for c in &self.clusters {
            let label = SourceName::parse(&c.source)
                .map(|s| s.display_name().to_string())
                .unwrap_or_else(|| c.source.clone());
            for q in &c.quotes {
                items.push(TileItem {
                    title: c.theme.clone(),
                    snippet: q.text.clone(),
                    url: q.url.clone(),
                    source: Some(label.clone()),
                    published: None,
                });
            }
            for cit in &c.citations {
                if !citations.iter().any(|x| x.url == cit.url) {
                    citations.push(cit.clone());
                }
            }
            if !c.insight.is_empty() {
                insights.push(c.insight.clone());
            }
        }

        let sentiment = if self.clusters.is_empty() {
            breakdown::placeholder(None)
        } else {
            o
        };

        NormalizedTileData {
            metrics,
            items,
            insights,
            sentiment: Some(sentiment),
            citations,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reddit_payload() -> Value {
        json!({"posts": [
            {"title": "Love it", "selftext": "Would use daily", "url": "https://r/1", "sentiment": "positive"},
            {"title": "Hmm", "selftext": "Privacy?", "url": "https://r/2", "sentiment": "negative"},
            {"title": "Ok", "selftext": "Fine", "sentiment": 0.0},
            {"title": "Great", "selftext": "Take my money", "sentiment_score": 0.9}
        ]})
    }

    #[test]
    fn confidence_formula_and_cap() {
        assert!((confidence(0, 0) - 0.3).abs() < 1e-9);
        assert!((confidence(1, 100) - 0.7).abs() < 1e-9);
        assert!((confidence(4, 1000) - 0.95).abs() < 1e-9);
    }

    #[test]
    fn per_source_percentages_from_labels() {
        let c = build_cluster(SourceName::Reddit, &reddit_payload()).unwrap();
        assert_eq!(c.volume, 4);
        assert_eq!(c.sentiment, Sentiment::new(50, 25, 25));
        assert_eq!(c.quotes.len(), 3);
        assert_eq!(c.quotes[0].text, "Would use daily");
        assert_eq!(c.citations.len(), 2);
    }

    #[test]
    fn explicit_breakdown_wins_over_labels() {
        let raw = json!({"total_mentions": 40, "sentiment": {"positive": 20, "neutral": 10, "negative": 10}});
        let c = build_cluster(SourceName::News, &raw).unwrap();
        assert_eq!(c.volume, 40);
        assert_eq!(c.sentiment, Sentiment::new(50, 25, 25));
    }

    #[test]
    fn zero_volume_sources_are_discarded() {
        let mut results = SourceResults::new();
        results.insert(SourceName::Twitter, Some(json!({"tweets": []})));
        results.insert(SourceName::Reddit, Some(reddit_payload()));
        let u = aggregate("Meal kits", &results);
        assert_eq!(u.clusters.len(), 1);
        assert_eq!(u.metrics.source_count, 1);
    }

    #[test]
    fn overall_is_unweighted_mean() {
        let mut results = SourceResults::new();
        results.insert(
            SourceName::News,
            Some(json!({"total_mentions": 1000, "sentiment": {"positive": 100, "neutral": 0, "negative": 0}})),
        );
        results.insert(
            SourceName::Twitter,
            Some(json!({"total_mentions": 1, "sentiment": {"positive": 0, "neutral": 0, "negative": 1}})),
        );
        let u = aggregate("x", &results);
        assert_eq!(u.metrics.overall_distribution, Sentiment::new(50, 0, 50));
        assert_eq!(u.metrics.total_mentions, 1001);
    }

    #[test]
    fn into_tile_carries_quotes_and_citations() {
        let mut results = SourceResults::new();
        results.insert(SourceName::Reddit, Some(reddit_payload()));
        let tile = aggregate("Meal kits", &results).into_tile();
        assert_eq!(tile.items.len(), 3);
        assert_eq!(tile.items[0].source.as_deref(), Some("Reddit"));
        assert_eq!(tile.citations.len(), 2);
        assert_eq!(tile.insights.len(), 2);
        assert_eq!(tile.metrics[0].name, "Overall Sentiment");
    }
}
