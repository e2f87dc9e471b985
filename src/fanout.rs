//! Concurrent fan-out/join across upstream sources.
//!
//! Every source is invoked at once and the join waits for all of them, so
//! latency is bounded by the slowest single source. A source that still
//! fails after its retries becomes `None` in the result map; nothing is
//! raised here.

use std::time::Instant;

use futures::future::join_all;
use metrics::counter;
use tracing::{info, warn};

use crate::aggregate::SourceResults;
use crate::fetchers::DynFetcher;
use crate::metrics::SOURCE_FAILURES;
use crate::query::QueryContext;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::source::SourceName;
use crate::telemetry::anon_hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: SourceName,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct FanOut {
    pub results: SourceResults,
    pub failures: Vec<SourceFailure>,
}

impl FanOut {
    /// True when sources were attempted and none of them answered.
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.failures.len() == self.results.len()
    }

    pub fn last_error(&self) -> String {
        self.failures
            .last()
            .map(|f| f.error.clone())
            .unwrap_or_else(|| "no sources attempted".to_string())
    }
}

pub async fn fan_out(
    fetcher: &DynFetcher,
    sources: &[SourceName],
    ctx: &QueryContext,
    policy: &RetryPolicy,
) -> FanOut {
    let started = Instant::now();
    let id = anon_hash(&ctx.idea_text);

    let calls = sources.iter().map(|&source| {
        let fetcher = fetcher.clone();
        async move {
            let res = retry_with_backoff(policy, source.as_str(), || fetcher.invoke(source, ctx)).await;
            (source, res)
        }
    });

    let mut out = FanOut::default();
    for (source, res) in join_all(calls).await {
        match res {
            Ok(value) => {
                out.results.insert(source, Some(value));
            }
            Err(e) => {
                counter!(SOURCE_FAILURES, "source" => source.as_str()).increment(1);
                warn!(target: "fanout", %id, source = source.as_str(), error = %e, "source unavailable");
                out.results.insert(source, None);
                out.failures.push(SourceFailure {
                    source,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        target: "fanout",
        %id,
        sources = sources.len(),
        failed = out.failures.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fan-out joined"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetchers::FixedFetcher;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn quick() -> RetryPolicy {
        RetryPolicy::default().with_base_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn failed_sources_become_none() {
        let f: DynFetcher = Arc::new(
            FixedFetcher::new()
                .with(SourceName::Reddit, json!({"posts": []}))
                .failing(SourceName::Twitter, "rate limited"),
        );
        let ctx = QueryContext::new("idea", "sentiment");
        let out = fan_out(&f, &[SourceName::Reddit, SourceName::Twitter], &ctx, &quick()).await;
        assert!(out.results[&SourceName::Reddit].is_some());
        assert!(out.results[&SourceName::Twitter].is_none());
        assert_eq!(out.failures.len(), 1);
        assert!(!out.all_failed());
    }

    #[tokio::test]
    async fn retries_each_source_independently() {
        let fixed = Arc::new(
            FixedFetcher::new()
                .flaky(SourceName::News, 2, json!({"articles": []}))
                .with(SourceName::YouTube, json!({"videos": []})),
        );
        let f: DynFetcher = fixed.clone();
        let ctx = QueryContext::new("idea", "sentiment");
        let out = fan_out(&f, &[SourceName::News, SourceName::YouTube], &ctx, &quick()).await;
        assert!(out.failures.is_empty());
        assert_eq!(fixed.calls_for(SourceName::News), 3);
        assert_eq!(fixed.calls_for(SourceName::YouTube), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sources_run_concurrently() {
        let d = Duration::from_secs(5);
        let f: DynFetcher = Arc::new(
            FixedFetcher::new()
                .with(SourceName::Reddit, json!({}))
                .with(SourceName::News, json!({}))
                .delayed(SourceName::Reddit, d)
                .delayed(SourceName::News, d),
        );
        let ctx = QueryContext::new("idea", "sentiment");
        let started = tokio::time::Instant::now();
        fan_out(&f, &[SourceName::Reddit, SourceName::News], &ctx, &RetryPolicy::default()).await;
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test]
    async fn all_failed_is_detected() {
        let f: DynFetcher = Arc::new(FixedFetcher::new());
        let ctx = QueryContext::new("idea", "news");
        let out = fan_out(&f, &[SourceName::News], &ctx, &RetryPolicy::default().with_max_retries(0)).await;
        assert!(out.all_failed());
        assert!(out.last_error().contains("no fixture"));
    }
}
