//! Upstream fetchers: opaque adapters that turn a query into raw JSON.
//!
//! The pipeline only relies on [`Fetcher::invoke`]; how a source is reached
//! (serverless function, demo generator, canned fixture) is the adapter's
//! business.

pub mod demo;
pub mod fixed;
pub mod http;

use std::sync::Arc;

use serde_json::Value;

use crate::query::QueryContext;
use crate::source::SourceName;

pub use demo::DemoFetcher;
pub use fixed::FixedFetcher;
pub use http::HttpFetcher;

#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch raw data for one source. Timeouts are enforced by the caller.
    async fn invoke(&self, source: SourceName, ctx: &QueryContext) -> anyhow::Result<Value>;
    /// Adapter name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynFetcher = Arc<dyn Fetcher>;
