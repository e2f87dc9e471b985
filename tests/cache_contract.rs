// tests/cache_contract.rs
//
// Cache layer contract:
// - put/get round trip within TTL, lazy expiry after it
// - key derivation independent of filter field order
// - refresh = invalidate → fetch → put, and stale in-flight writes are dropped
// - durable tier only for identified users, with the same staleness guard
// - expired entries do not accumulate

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use idea_pulse::cache::{
    CacheKey, CacheScope, DurableRecord, DurableStore, FileStore, MemoryCache, PutOutcome, RequestId,
    TieredCache, TileCache,
};
use idea_pulse::fetchers::fixed::FixedReply;
use idea_pulse::fetchers::FixedFetcher;
use idea_pulse::source::SourceName;
use idea_pulse::tile::NormalizedTileData;
use idea_pulse::{CacheStatus, QueryContext, SortOrder, TilePipeline};

fn payload(tag: &str) -> NormalizedTileData {
    let mut d = NormalizedTileData::default().ensure_metrics();
    d.insights.push(tag.to_string());
    d
}

#[tokio::test]
async fn round_trip_then_lazy_expiry() {
    let cache = MemoryCache::default();
    let scope = CacheScope::anonymous();
    let key = CacheKey::derive(&QueryContext::new("idea", "news"));

    let t0 = Utc::now();
    assert_eq!(
        cache.store_at(&key, payload("a"), cache.begin(), t0),
        PutOutcome::Stored
    );
    assert_eq!(cache.get(&key, &scope).await.map(|e| e.payload), Some(payload("a")));

    let after_ttl = t0 + chrono::Duration::minutes(31);
    assert!(cache.lookup_at(&key, after_ttl).is_none());
    // still physically present
    assert_eq!(cache.len(), 1);
}

#[test]
fn key_is_independent_of_filter_order() {
    let a = CacheKey::from_json(&json!({
        "tileType": "news", "industry": "fintech", "geography": "US", "ideaText": "Robo advisor"
    }))
    .unwrap();
    let b = CacheKey::from_json(&json!({
        "geography": "US", "tileType": "news", "industry": "fintech", "ideaText": "Robo advisor"
    }))
    .unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_string(), b.to_string());
}

fn quick_pipeline(fetcher: Arc<FixedFetcher>, cache: Arc<dyn TileCache>) -> TilePipeline {
    TilePipeline::new(fetcher, cache).with_retry(
        idea_pulse::retry::RetryPolicy::default().with_base_delay(Duration::from_millis(1)),
    )
}

#[tokio::test]
async fn refresh_bypasses_and_replaces_the_cached_entry() {
    let fetcher = Arc::new(FixedFetcher::new().with(SourceName::Llm, json!({"score": 30})));
    let pipeline = quick_pipeline(fetcher.clone(), Arc::new(MemoryCache::default()));
    let scope = CacheScope::anonymous();
    let ctx = QueryContext::new("idea", "pmf_score");

    let first = pipeline.fetch(ctx.clone(), &scope, SortOrder::Relevance).await.unwrap();
    assert_eq!(first.data.metrics[0].value, "30%");

    fetcher.set(SourceName::Llm, FixedReply::Data(json!({"score": 90})));
    let cached = pipeline.fetch(ctx.clone(), &scope, SortOrder::Relevance).await.unwrap();
    assert_eq!(cached.cache, CacheStatus::Hit);
    assert_eq!(cached.data.metrics[0].value, "30%");

    let refreshed = pipeline.refresh(ctx.clone(), &scope, SortOrder::Relevance).await.unwrap();
    assert_eq!(refreshed.cache, CacheStatus::Miss);
    assert_eq!(refreshed.data.metrics[0].value, "90%");

    let after = pipeline.fetch(ctx, &scope, SortOrder::Relevance).await.unwrap();
    assert_eq!(after.cache, CacheStatus::Hit);
    assert_eq!(after.data.metrics[0].value, "90%");
    assert_eq!(fetcher.total_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn refresh_supersedes_an_in_flight_fetch() {
    // slow upstream: the first fetch is still in flight when refresh runs
    let fetcher = Arc::new(
        FixedFetcher::new()
            .with(SourceName::Llm, json!({"score": 10}))
            .delayed(SourceName::Llm, Duration::from_secs(5)),
    );
    let pipeline = Arc::new(quick_pipeline(fetcher.clone(), Arc::new(MemoryCache::default())));
    let scope = CacheScope::anonymous();
    let ctx = QueryContext::new("idea", "pmf_score");

    let slow = {
        let p = pipeline.clone();
        let (ctx, scope) = (ctx.clone(), scope.clone());
        tokio::spawn(async move { p.fetch(ctx, &scope, SortOrder::Relevance).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;

    fetcher.set(SourceName::Llm, FixedReply::Data(json!({"score": 95})));
    let refreshed = pipeline.refresh(ctx.clone(), &scope, SortOrder::Relevance).await.unwrap();
    assert_eq!(refreshed.data.metrics[0].value, "95%");

    // the old request finishes with old data but must not overwrite the cache
    let old = slow.await.unwrap().unwrap();
    assert_eq!(old.data.metrics[0].value, "10%");

    let now = pipeline.fetch(ctx, &scope, SortOrder::Relevance).await.unwrap();
    assert_eq!(now.cache, CacheStatus::Hit);
    assert_eq!(now.data.metrics[0].value, "95%");
}

#[tokio::test]
async fn durable_tier_serves_other_instances_for_the_same_user() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DurableStore> = Arc::new(FileStore::new(dir.path()).unwrap());
    let fetcher = Arc::new(FixedFetcher::new().with(SourceName::News, json!({"articles": [
        {"title": "Funding round", "url": "https://news.example.com/a", "source": {"name": "Wire"}}
    ]})));

    let a = quick_pipeline(
        fetcher.clone(),
        Arc::new(TieredCache::new(MemoryCache::default(), Some(store.clone()))),
    );
    let b = quick_pipeline(
        fetcher.clone(),
        Arc::new(TieredCache::new(MemoryCache::default(), Some(store))),
    );
    let ctx = QueryContext::new("idea", "news");
    let user = CacheScope::user("user-1").with_session("s-1");

    assert_eq!(a.fetch(ctx.clone(), &user, SortOrder::Relevance).await.unwrap().cache, CacheStatus::Miss);
    // fresh process-local tier, same durable store
    assert_eq!(b.fetch(ctx.clone(), &user, SortOrder::Relevance).await.unwrap().cache, CacheStatus::Hit);
    // anonymous callers never see the durable tier
    assert_eq!(
        b.fetch(ctx, &CacheScope::anonymous(), SortOrder::Relevance).await.unwrap().cache,
        CacheStatus::Miss
    );
    assert_eq!(fetcher.total_calls(), 2);
}

/// File store whose first save stalls, like a slow network disk.
struct SlowFirstSave {
    inner: FileStore,
    saves: AtomicUsize,
    stall: Duration,
}

#[async_trait::async_trait]
impl DurableStore for SlowFirstSave {
    async fn load(
        &self,
        user_id: &str,
        key: &CacheKey,
        session_id: Option<&str>,
    ) -> anyhow::Result<Option<DurableRecord>> {
        self.inner.load(user_id, key, session_id).await
    }

    async fn save(&self, user_id: &str, key: &CacheKey, record: DurableRecord) -> anyhow::Result<PutOutcome> {
        if self.saves.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(self.stall).await;
        }
        self.inner.save(user_id, key, record).await
    }

    async fn delete(&self, user_id: &str, key: &CacheKey, fence: RequestId) -> anyhow::Result<()> {
        self.inner.delete(user_id, key, fence).await
    }
}

#[tokio::test]
async fn late_durable_write_from_before_refresh_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DurableStore> = Arc::new(SlowFirstSave {
        inner: FileStore::new(dir.path()).unwrap(),
        saves: AtomicUsize::new(0),
        stall: Duration::from_millis(300),
    });
    let fetcher = Arc::new(FixedFetcher::new().with(SourceName::Llm, json!({"score": 10})));
    let pipeline = Arc::new(quick_pipeline(
        fetcher.clone(),
        Arc::new(TieredCache::new(MemoryCache::default(), Some(store.clone()))),
    ));
    let user = CacheScope::user("user-1");
    let ctx = QueryContext::new("idea", "pmf_score");

    // first fetch: upstream answers, the durable save stalls
    let slow = {
        let p = pipeline.clone();
        let (ctx, user) = (ctx.clone(), user.clone());
        tokio::spawn(async move { p.fetch(ctx, &user, SortOrder::Relevance).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    fetcher.set(SourceName::Llm, FixedReply::Data(json!({"score": 95})));
    let refreshed = pipeline.refresh(ctx.clone(), &user, SortOrder::Relevance).await.unwrap();
    assert_eq!(refreshed.data.metrics[0].value, "95%");

    let old = slow.await.unwrap().unwrap();
    assert_eq!(old.data.metrics[0].value, "10%");

    let now = pipeline.fetch(ctx.clone(), &user, SortOrder::Relevance).await.unwrap();
    assert_eq!(now.cache, CacheStatus::Hit);
    assert_eq!(now.data.metrics[0].value, "95%");

    // another instance reading the same store agrees
    let other = quick_pipeline(
        fetcher.clone(),
        Arc::new(TieredCache::new(MemoryCache::default(), Some(store))),
    );
    let seen = other.fetch(ctx, &user, SortOrder::Relevance).await.unwrap();
    assert_eq!(seen.cache, CacheStatus::Hit);
    assert_eq!(seen.data.metrics[0].value, "95%");
    assert_eq!(fetcher.total_calls(), 2);
}

#[test]
fn expired_entries_do_not_accumulate() {
    let cache = MemoryCache::new(Duration::ZERO);
    for i in 0..10_000 {
        let key = CacheKey::derive(&QueryContext::new(format!("idea {i}"), "news"));
        cache.store(&key, payload("x"), cache.next_request());
    }
    let held = cache.slot_count();
    assert!(held < 1_000);
    assert_eq!(cache.sweep(Utc::now()), held);
    assert_eq!(cache.slot_count(), 0);
}
