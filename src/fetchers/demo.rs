//! DEMO / FALLBACK adapter. Produces synthetic, plausible-looking payloads
//! so the dashboard can be exercised without API keys. Never use its output
//! as market signal.
//!
//! Randomness lives only here. The generator is seeded from the query and
//! source, so a given query always produces the same demo data.

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::Fetcher;
use crate::query::QueryContext;
use crate::source::SourceName;

const LABELS: [&str; 3] = ["positive", "neutral", "negative"];

#[derive(Debug, Default, Clone)]
pub struct DemoFetcher;

impl DemoFetcher {
    pub fn new() -> Self {
        Self
    }

    fn rng_for(source: SourceName, ctx: &QueryContext) -> StdRng {
        let mut hasher = Sha256::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(ctx.idea_text.trim().to_lowercase().as_bytes());
        hasher.update(ctx.industry.as_deref().unwrap_or_default().as_bytes());
        hasher.update(ctx.geography.as_deref().unwrap_or_default().as_bytes());
        let digest = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        StdRng::seed_from_u64(u64::from_le_bytes(seed))
    }
}

fn label(rng: &mut StdRng) -> &'static str {
    // skewed towards positive, as early-stage discussion usually is
    match rng.random_range(0..10u8) {
        0..=4 => LABELS[0],
        5..=7 => LABELS[1],
        _ => LABELS[2],
    }
}

fn generate(source: SourceName, idea: &str, rng: &mut StdRng) -> Value {
    let n = rng.random_range(3..8usize);
    match source {
        SourceName::Reddit => {
            let posts: Vec<Value> = (0..n)
                .map(|i| {
                    json!({
                        "title": format!("[demo] Thoughts on {idea} #{i}"),
                        "selftext": format!("Demo discussion thread {i} about {idea}."),
                        "permalink": format!("/r/startups/comments/demo{i}"),
                        "subreddit": "startups",
                        "score": rng.random_range(1..500u32),
                        "num_comments": rng.random_range(0..120u32),
                        "created_utc": 1_700_000_000 + i * 3600,
                        "sentiment": label(rng),
                    })
                })
                .collect();
            json!({ "posts": posts, "demo": true })
        }
        SourceName::Twitter => {
            let tweets: Vec<Value> = (0..n)
                .map(|i| {
                    json!({
                        "text": format!("[demo] Would I use {idea}? Take {i}."),
                        "url": format!("https://x.com/demo/status/{i}"),
                        "like_count": rng.random_range(0..300u32),
                        "sentiment": label(rng),
                    })
                })
                .collect();
            json!({ "tweets": tweets, "demo": true })
        }
        SourceName::YouTube => {
            let videos: Vec<Value> = (0..n)
                .map(|i| {
                    json!({
                        "title": format!("[demo] {idea} explained, part {i}"),
                        "description": "Demo video description.",
                        "videoId": format!("demo{i:04}"),
                        "channelTitle": "Demo Channel",
                        "viewCount": rng.random_range(100..100_000u64).to_string(),
                        "likeCount": rng.random_range(0..5_000u64).to_string(),
                        "sentiment": label(rng),
                    })
                })
                .collect();
            json!({ "videos": videos, "demo": true })
        }
        SourceName::News => {
            let articles: Vec<Value> = (0..n)
                .map(|i| {
                    json!({
                        "title": format!("[demo] Market watch: {idea} ({i})"),
                        "description": "Demo news coverage.",
                        "url": format!("https://news.example.com/demo/{i}"),
                        "source": {"name": "Demo Wire"},
                        "seendate": format!("202401{:02}T120000Z", (i % 28) + 1),
                        "tone": f64::from(rng.random_range(-50..50i32)) / 10.0,
                    })
                })
                .collect();
            json!({ "articles": articles, "demo": true })
        }
        SourceName::WebSearch => {
            let results: Vec<Value> = (0..n)
                .map(|i| {
                    json!({
                        "title": format!("[demo] {idea} - result {i}"),
                        "link": format!("https://search.example.com/{i}"),
                        "snippet": "Demo search snippet.",
                        "source": "example.com",
                    })
                })
                .collect();
            json!({
                "search_information": {"total_results": rng.random_range(1_000..1_000_000u64)},
                "organic_results": results,
                "demo": true
            })
        }
        SourceName::Llm => json!({
            "score": rng.random_range(20..95u32),
            "insights": [
                format!("[demo] Early adopters for {idea} appear reachable online."),
                "[demo] Validate willingness to pay before building.",
            ],
            "demo": true
        }),
    }
}

#[async_trait::async_trait]
impl Fetcher for DemoFetcher {
    async fn invoke(&self, source: SourceName, ctx: &QueryContext) -> Result<Value> {
        let mut rng = Self::rng_for(source, ctx);
        Ok(generate(source, ctx.idea_text.trim(), &mut rng))
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    #[tokio::test]
    async fn demo_output_is_reproducible_per_query() {
        let f = DemoFetcher::new();
        let ctx = QueryContext::new("Dog walking app", "reddit");
        let a = f.invoke(SourceName::Reddit, &ctx).await.unwrap();
        let b = f.invoke(SourceName::Reddit, &ctx).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a["demo"], true);
    }

    #[tokio::test]
    async fn demo_payloads_normalize_with_items() {
        let f = DemoFetcher::new();
        let ctx = QueryContext::new("Dog walking app", "news");
        for (source, tile) in [
            (SourceName::Reddit, "reddit"),
            (SourceName::YouTube, "youtube"),
            (SourceName::News, "news"),
            (SourceName::WebSearch, "web_search"),
        ] {
            let raw = f.invoke(source, &ctx).await.unwrap();
            let d = normalize(tile, &raw);
            assert!(!d.items.is_empty(), "{tile} should have items");
        }
    }
}
