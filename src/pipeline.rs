//! # Tile Pipeline
//! The service behind every tile action.
//!
//! - `fetch`: read-through cache, on miss go upstream, normalize, write-through.
//! - `refresh`: invalidate (awaited) → fetch → put. Never races a stale read.
//! - `analyze`: tile data (cached or fresh) plus an LLM synthesis pass whose
//!   insights are merged and written back.
//!
//! Every request takes a [`RequestId`] before touching upstream; the cache
//! drops writes from requests that a later refresh has superseded.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::aggregate::aggregate;
use crate::cache::{CacheKey, CacheScope, PutOutcome, RequestId, TileCache};
use crate::error::{PipelineError, Result};
use crate::fanout::fan_out;
use crate::fetchers::DynFetcher;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, FETCH_MS};
use crate::normalize::normalize_for;
use crate::query::{QueryContext, SortOrder};
use crate::retry::RetryPolicy;
use crate::source::SourceName;
use crate::synth::{DisabledSynthesizer, DynSynthesizer};
use crate::telemetry::anon_hash;
use crate::tile::{NormalizedTileData, TileKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_header(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TileResponse {
    pub data: NormalizedTileData,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone)]
pub struct AnalyzeResponse {
    pub data: NormalizedTileData,
    pub cache: CacheStatus,
    pub ai_used: bool,
    pub provider: &'static str,
}

/// What a read-through produced, and when it entered the cache.
struct ReadThrough {
    data: NormalizedTileData,
    cache: CacheStatus,
    request: RequestId,
    stored_at: DateTime<Utc>,
}

pub struct TilePipeline {
    fetcher: DynFetcher,
    cache: Arc<dyn TileCache>,
    synth: DynSynthesizer,
    retry: RetryPolicy,
}

impl TilePipeline {
    pub fn new(fetcher: DynFetcher, cache: Arc<dyn TileCache>) -> Self {
        Self {
            fetcher,
            cache,
            synth: Arc::new(DisabledSynthesizer),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_synthesizer(mut self, synth: DynSynthesizer) -> Self {
        self.synth = synth;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn synthesizer_name(&self) -> &'static str {
        self.synth.provider_name()
    }

    pub async fn fetch(
        &self,
        ctx: QueryContext,
        scope: &CacheScope,
        sort: SortOrder,
    ) -> Result<TileResponse> {
        let ctx = ctx.validate()?;
        let key = CacheKey::derive(&ctx);
        let ReadThrough { mut data, cache, .. } = self.read_through(&ctx, &key, scope).await?;
        data.sort_items(sort);
        Ok(TileResponse { data, cache })
    }

    pub async fn refresh(
        &self,
        ctx: QueryContext,
        scope: &CacheScope,
        sort: SortOrder,
    ) -> Result<TileResponse> {
        let ctx = ctx.validate()?;
        let key = CacheKey::derive(&ctx);

        // must complete before the new request id is taken
        self.cache.invalidate(&key, scope).await;
        info!(target: "pipeline", id = %anon_hash(&ctx.idea_text), tile = %ctx.tile_type, "cache invalidated for refresh");

        let request = self.cache.begin();
        counter!(CACHE_MISSES, "tile" => ctx.tile_type.clone()).increment(1);
        let data = self.load(&ctx).await?;
        self.write(&key, data.clone(), request, Utc::now(), scope).await;

        let mut data = data;
        data.sort_items(sort);
        Ok(TileResponse {
            data,
            cache: CacheStatus::Miss,
        })
    }

    pub async fn analyze(
        &self,
        ctx: QueryContext,
        scope: &CacheScope,
        sort: SortOrder,
    ) -> Result<AnalyzeResponse> {
        let ctx = ctx.validate()?;
        let key = CacheKey::derive(&ctx);
        let ReadThrough {
            mut data,
            cache,
            request,
            stored_at,
        } = self.read_through(&ctx, &key, scope).await?;

        let provider = self.synth.provider_name();
        let lines = self.synth.synthesize(&ctx, &data).await;
        let ai_used = lines.is_some();
        if let Some(lines) = lines {
            let added = data.merge_insights(lines);
            if added > 0 {
                // amends the cached entry; its expiry stays where it was
                self.write(&key, data.clone(), request, stored_at, scope).await;
            }
            info!(target: "pipeline", id = %anon_hash(&ctx.idea_text), tile = %ctx.tile_type, provider, added, "analysis merged");
        } else {
            debug!(target: "pipeline", provider, "no synthesis output");
        }

        data.sort_items(sort);
        Ok(AnalyzeResponse {
            data,
            cache,
            ai_used,
            provider,
        })
    }

    /// Cached payload, or a fresh one written through. The request id is
    /// taken before the cache read so that any later write-back is fenced by
    /// a refresh that happens in between.
    async fn read_through(
        &self,
        ctx: &QueryContext,
        key: &CacheKey,
        scope: &CacheScope,
    ) -> Result<ReadThrough> {
        let request = self.cache.begin();
        if let Some(entry) = self.cache.get(key, scope).await {
            counter!(CACHE_HITS, "tile" => ctx.tile_type.clone()).increment(1);
            debug!(target: "pipeline", id = %anon_hash(&ctx.idea_text), tile = %ctx.tile_type, "cache hit");
            return Ok(ReadThrough {
                data: entry.payload,
                cache: CacheStatus::Hit,
                request,
                stored_at: entry.stored_at,
            });
        }

        counter!(CACHE_MISSES, "tile" => ctx.tile_type.clone()).increment(1);
        let data = self.load(ctx).await?;
        let stored_at = Utc::now();
        self.write(key, data.clone(), request, stored_at, scope).await;
        Ok(ReadThrough {
            data,
            cache: CacheStatus::Miss,
            request,
            stored_at,
        })
    }

    async fn write(
        &self,
        key: &CacheKey,
        data: NormalizedTileData,
        request: RequestId,
        stored_at: DateTime<Utc>,
        scope: &CacheScope,
    ) {
        if self.cache.put_at(key, data, request, stored_at, scope).await == PutOutcome::Stale {
            debug!(target: "pipeline", key = %key.tile_type, request = request.0, "superseded response not cached");
        }
    }

    /// Upstream fetch + normalize, stamped with the fetch time.
    async fn load(&self, ctx: &QueryContext) -> Result<NormalizedTileData> {
        let started = Instant::now();
        let kind = TileKind::parse(&ctx.tile_type);
        let sources = SourceName::for_tile(&kind);
        let fan = fan_out(&self.fetcher, &sources, ctx, &self.retry).await;

        if fan.all_failed() {
            return Err(PipelineError::TotalFetchFailure {
                tile_type: ctx.tile_type.clone(),
                attempted: sources.len(),
                last_error: fan.last_error(),
            });
        }

        let data = match kind {
            TileKind::Sentiment => aggregate(&ctx.idea_text, &fan.results)
                .into_tile()
                .with_filters(ctx)
                .ensure_metrics(),
            _ => {
                let raw = fan
                    .results
                    .values()
                    .find_map(|v| v.as_ref())
                    .cloned()
                    .unwrap_or_default();
                normalize_for(ctx, &raw)
            }
        };

        let elapsed = started.elapsed();
        histogram!(FETCH_MS, "tile" => ctx.tile_type.clone()).record(elapsed.as_secs_f64() * 1000.0);
        info!(
            target: "pipeline",
            id = %anon_hash(&ctx.idea_text),
            tile = %ctx.tile_type,
            failed_sources = fan.failures.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "tile loaded"
        );
        Ok(data.stamped(Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::fetchers::FixedFetcher;
    use crate::synth::MockSynthesizer;
    use serde_json::json;
    use std::time::Duration;

    fn quick() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_max_retries(1)
    }

    fn pipeline(fetcher: Arc<FixedFetcher>) -> TilePipeline {
        TilePipeline::new(fetcher, Arc::new(MemoryCache::default())).with_retry(quick())
    }

    #[tokio::test]
    async fn second_fetch_is_a_hit() {
        let f = Arc::new(FixedFetcher::new().with(SourceName::Llm, json!({"score": 55})));
        let p = pipeline(f.clone());
        let scope = CacheScope::anonymous();
        let ctx = QueryContext::new("idea", "pmf_score");
        let a = p.fetch(ctx.clone(), &scope, SortOrder::Relevance).await.unwrap();
        let b = p.fetch(ctx, &scope, SortOrder::Relevance).await.unwrap();
        assert_eq!(a.cache, CacheStatus::Miss);
        assert_eq!(b.cache, CacheStatus::Hit);
        assert_eq!(a.data, b.data);
        assert_eq!(f.total_calls(), 1);
    }

    #[tokio::test]
    async fn blank_idea_never_reaches_upstream() {
        let f = Arc::new(FixedFetcher::new());
        let p = pipeline(f.clone());
        let err = p
            .fetch(QueryContext::new("   ", "news"), &CacheScope::anonymous(), SortOrder::Relevance)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert_eq!(f.total_calls(), 0);
    }

    #[tokio::test]
    async fn single_source_failure_is_total() {
        let f = Arc::new(FixedFetcher::new().failing(SourceName::News, "503"));
        let p = pipeline(f.clone());
        let err = p
            .fetch(QueryContext::new("idea", "news"), &CacheScope::anonymous(), SortOrder::Relevance)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        // one attempt + one retry
        assert_eq!(f.calls_for(SourceName::News), 2);
    }

    #[tokio::test]
    async fn analyze_merges_and_writes_back() {
        let f = Arc::new(FixedFetcher::new().with(
            SourceName::Llm,
            json!({"score": 80, "insights": ["Clear pain point"]}),
        ));
        let p = pipeline(f.clone()).with_synthesizer(Arc::new(MockSynthesizer::new([
            "Clear pain point",
            "Pricing needs validation",
        ])));
        let scope = CacheScope::anonymous();
        let ctx = QueryContext::new("idea", "pmf_score");
        let out = p.analyze(ctx.clone(), &scope, SortOrder::Relevance).await.unwrap();
        assert!(out.ai_used);
        assert_eq!(out.provider, "mock");
        assert_eq!(
            out.data.insights,
            vec!["Clear pain point".to_string(), "Pricing needs validation".to_string()]
        );
        let again = p.fetch(ctx, &scope, SortOrder::Relevance).await.unwrap();
        assert_eq!(again.cache, CacheStatus::Hit);
        assert_eq!(again.data.insights.len(), 2);
    }

    #[tokio::test]
    async fn analyze_write_back_keeps_entry_age() {
        let cache = Arc::new(MemoryCache::default());
        let p = TilePipeline::new(Arc::new(FixedFetcher::new()), cache.clone())
            .with_retry(quick())
            .with_synthesizer(Arc::new(MockSynthesizer::new(["Fresh angle"])));
        let ctx = QueryContext::new("idea", "pmf_score");
        let key = CacheKey::derive(&ctx);
        let t0 = Utc::now() - chrono::Duration::minutes(20);
        cache.store_at(&key, NormalizedTileData::default().ensure_metrics(), cache.next_request(), t0);

        let out = p.analyze(ctx, &CacheScope::anonymous(), SortOrder::Relevance).await.unwrap();
        assert_eq!(out.cache, CacheStatus::Hit);
        let entry = cache.lookup(&key).unwrap();
        assert_eq!(entry.stored_at, t0);
        assert_eq!(entry.payload.insights, vec!["Fresh angle".to_string()]);
        assert!(cache.lookup_at(&key, t0 + chrono::Duration::minutes(30)).is_none());
    }

    #[tokio::test]
    async fn analyze_without_ai_still_serves_data() {
        let f = Arc::new(FixedFetcher::new().with(SourceName::Llm, json!({"score": 20})));
        let out = pipeline(f)
            .analyze(QueryContext::new("idea", "pmf_score"), &CacheScope::anonymous(), SortOrder::Relevance)
            .await
            .unwrap();
        assert!(!out.ai_used);
        assert_eq!(out.provider, "disabled");
        assert_eq!(out.data.metrics[0].explanation.as_deref(), Some("Weak PMF"));
    }
}
