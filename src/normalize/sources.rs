//! Per-source mappings. Each one reads its typed shape from the layer the
//! fallback chain finds, then fills the common tile shape.

use std::collections::BTreeSet;

use serde_json::Value;

use super::shapes::{
    self, Common, GenericPayload, MetricValue, NewsPayload, PmfPayload, RedditPayload, SerpPayload,
    YouTubePayload,
};
use super::{breakdown, citations_from_items, clean_text, fmt_number, locate};
use crate::aggregate::UnifiedSentiment;
use crate::tile::{Metric, NormalizedTileData, TileItem};

pub(super) fn pmf(raw: &Value) -> NormalizedTileData {
    let (payload, v) = shapes::read::<PmfPayload>(raw);
    let common: Common = shapes::parse(v);
    let score = payload.score().clamp(0.0, 100.0).round() as i64;
    let (sentiment, explanation) = breakdown::pmf_breakdown(score);

    NormalizedTileData {
        metrics: vec![Metric::new("PMF Score", format!("{score}%")).explanation(explanation)],
        insights: common.insights(),
        sentiment: Some(sentiment),
        ..Default::default()
    }
}

pub(super) fn reddit(raw: &Value) -> NormalizedTileData {
    let (payload, v) = shapes::read::<RedditPayload>(raw);
    let posts = payload.entries();

    let upvotes: f64 = posts.iter().map(|p| p.upvotes()).sum();
    let comments: f64 = posts.iter().map(|p| p.comment_count()).sum();
    let items: Vec<TileItem> = posts
        .iter()
        .map(|p| TileItem {
            title: p.title.clone().unwrap_or_default(),
            snippet: p.snippet().unwrap_or_default(),
            url: p.url(),
            source: p.community(),
            published: p.published(),
        })
        .collect();

    let n = items.len() as f64;
    let avg = if n > 0.0 { (upvotes / n).round() } else { 0.0 };
    let metrics = vec![
        Metric::new("Posts Found", fmt_number(n)),
        Metric::new("Avg Upvotes", fmt_number(avg)),
        Metric::new("Total Comments", fmt_number(comments)),
    ];

    finish(v, metrics, items, "Reddit")
}

pub(super) fn youtube(raw: &Value) -> NormalizedTileData {
    let (payload, v) = shapes::read::<YouTubePayload>(raw);
    let videos = payload.entries();

    let views: f64 = videos.iter().map(|vid| vid.stats().views()).sum();
    let likes: f64 = videos.iter().map(|vid| vid.stats().likes()).sum();
    let items: Vec<TileItem> = videos
        .iter()
        .map(|vid| {
            let meta = vid.meta();
            TileItem {
                title: meta.title.clone().unwrap_or_default(),
                snippet: meta.description.clone().unwrap_or_default(),
                url: vid.url(),
                source: meta.channel(),
                published: meta.published(),
            }
        })
        .collect();

    let n = items.len() as f64;
    let avg_likes = if n > 0.0 { (likes / n).round() } else { 0.0 };
    let metrics = vec![
        Metric::new("Videos Found", fmt_number(n)),
        Metric::new("Total Views", fmt_number(views)),
        Metric::new("Avg Likes", fmt_number(avg_likes)),
    ];

    finish(v, metrics, items, "YouTube")
}

pub(super) fn news(raw: &Value) -> NormalizedTileData {
    let (payload, v) = shapes::read::<NewsPayload>(raw);

    let items: Vec<TileItem> = payload
        .entries()
        .iter()
        .map(|a| TileItem {
            title: a.title.clone().unwrap_or_default(),
            snippet: a.snippet().unwrap_or_default(),
            url: a.url(),
            source: a.outlet(),
            published: a.published(),
        })
        .collect();

    let outlets: BTreeSet<&str> = items.iter().filter_map(|i| i.source.as_deref()).collect();
    let metrics = vec![
        Metric::new("Articles", fmt_number(items.len() as f64)),
        Metric::new("Outlets", fmt_number(outlets.len() as f64)),
    ];

    finish(v, metrics, items, "News")
}

pub(super) fn web_search(raw: &Value) -> NormalizedTileData {
    let (payload, v) = shapes::read::<SerpPayload>(raw);
    let indexed = payload.indexed();

    let items: Vec<TileItem> = payload
        .entries()
        .iter()
        .map(|r| TileItem {
            title: r.title.clone().unwrap_or_default(),
            snippet: r.snippet().unwrap_or_default(),
            url: r.url(),
            source: r.site(),
            published: r.published(),
        })
        .collect();

    let metrics = vec![
        Metric::new("Results", fmt_number(items.len() as f64)),
        Metric::new("Indexed Pages", fmt_number(indexed)),
    ];

    finish(v, metrics, items, "Web")
}

/// A unified-sentiment payload produced elsewhere (e.g. a remote aggregator).
pub(super) fn unified_sentiment(raw: &Value) -> NormalizedTileData {
    let v = locate(raw, &["clusters", "metrics"]);
    let unified: UnifiedSentiment = shapes::parse(v);
    unified.into_tile()
}

/// Pass-through for tiles that already speak (roughly) the common shape.
pub(super) fn generic(raw: &Value) -> NormalizedTileData {
    let (payload, v) = shapes::read::<GenericPayload>(raw);

    let metrics = payload
        .metrics
        .iter()
        .filter_map(|m| {
            let name = m.name()?;
            let value = match m.value.as_ref()? {
                MetricValue::Text(s) => clean_text(s),
                MetricValue::Number(x) => fmt_number(*x),
                MetricValue::Flag(b) => b.to_string(),
            };
            let mut metric = Metric::new(name, value);
            metric.unit = m.unit.clone();
            metric.explanation = m.explanation();
            metric.confidence = m.confidence.map(|c| c.clamp(0.0, 1.0));
            Some(metric)
        })
        .collect();

    let items: Vec<TileItem> = payload
        .entries()
        .iter()
        .map(|i| TileItem {
            title: i.title().unwrap_or_default(),
            snippet: i.snippet().unwrap_or_default(),
            url: i.url(),
            source: i.source.clone(),
            published: i.published(),
        })
        .collect();

    finish(v, metrics, items, "Web")
}

/// Shared tail: insights, sentiment, citations (explicit ones first).
fn finish(v: &Value, metrics: Vec<Metric>, items: Vec<TileItem>, source: &str) -> NormalizedTileData {
    let common: Common = shapes::parse(v);
    let mut citations = common.citations(source);
    for c in citations_from_items(&items, source) {
        if !citations.iter().any(|x| x.url == c.url) {
            citations.push(c);
        }
    }

    NormalizedTileData {
        metrics,
        items,
        insights: common.insights(),
        sentiment: Some(common.sentiment()),
        citations,
        ..Default::default()
    }
}
