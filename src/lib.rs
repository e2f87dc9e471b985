// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod fanout;
pub mod fetchers;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod retry;
pub mod source;
pub mod synth;
pub mod telemetry;
pub mod tile;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::error::PipelineError;
pub use crate::pipeline::{CacheStatus, TilePipeline};
pub use crate::query::{QueryContext, SortOrder, TimeWindow};
pub use crate::tile::NormalizedTileData;

use std::sync::Arc;

use axum::Router;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::cache::{DurableStore, FileStore, MemoryCache, TieredCache};
use crate::config::{AiConfig, AppConfig, FetcherMode};
use crate::fetchers::{DemoFetcher, DynFetcher, HttpFetcher};
use crate::metrics::Metrics;

// The Prometheus recorder is process-global; install it once.
static METRICS: OnceCell<Metrics> = OnceCell::new();

/// Assemble the pipeline from config.
pub fn build_pipeline(cfg: &AppConfig) -> anyhow::Result<TilePipeline> {
    let fetcher: DynFetcher = match cfg.fetchers.mode {
        FetcherMode::Http => {
            let endpoints = cfg.endpoints();
            if endpoints.is_empty() {
                anyhow::bail!("fetcher mode is http but no endpoints are configured");
            }
            Arc::new(HttpFetcher::new(
                endpoints,
                cfg.bearer_token(),
                std::time::Duration::from_millis(cfg.fetchers.timeout_ms),
            )?)
        }
        FetcherMode::Demo => Arc::new(DemoFetcher::new()),
    };

    let durable: Option<Arc<dyn DurableStore>> = match &cfg.cache.store_dir {
        Some(dir) => Some(Arc::new(FileStore::new(dir)?)),
        None => None,
    };
    let cache = TieredCache::new(MemoryCache::new(cfg.ttl()), durable);

    let ai = AiConfig::load_or_disabled(&cfg.ai.config_path);
    let synth = synth::build_synthesizer(&ai);

    info!(
        fetcher = fetcher.name(),
        durable = cfg.cache.store_dir.is_some(),
        ttl_minutes = cfg.cache.ttl_minutes,
        synthesizer = synth.provider_name(),
        "pipeline configured"
    );

    Ok(TilePipeline::new(fetcher, Arc::new(cache))
        .with_retry(cfg.retry_policy())
        .with_synthesizer(synth))
}

/// Build the full application router (API + optional `/metrics`).
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AppConfig::load()?;
    let pipeline = build_pipeline(&cfg)?;
    let mut router = api::create_router(AppState::new(pipeline));

    if cfg.metrics.enabled {
        let ttl_ms = cfg.ttl().as_millis() as u64;
        let m = METRICS.get_or_try_init(|| Metrics::init(ttl_ms))?;
        router = router.merge(m.router());
    }
    Ok(router)
}
