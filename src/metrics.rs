use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const CACHE_HITS: &str = "tile_cache_hits_total";
pub const CACHE_MISSES: &str = "tile_cache_misses_total";
pub const SOURCE_FAILURES: &str = "source_failures_total";
pub const FETCH_MS: &str = "tile_fetch_ms";

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the cache TTL as a static gauge.
    pub fn init(ttl_ms: u64) -> anyhow::Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;

        describe_counter!(CACHE_HITS, "Tile requests served from cache");
        describe_counter!(CACHE_MISSES, "Tile requests that went upstream");
        describe_counter!(SOURCE_FAILURES, "Upstream sources that failed after retries");
        describe_histogram!(FETCH_MS, "Upstream fetch + normalize latency in milliseconds");

        // absolute TTL, no sliding refresh
        gauge!("tile_cache_ttl_ms").set(ttl_ms as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
