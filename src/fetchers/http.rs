//! Fetcher that calls one HTTP endpoint per source (the serverless search
//! functions), posting the query context as JSON.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;

use super::Fetcher;
use crate::query::QueryContext;
use crate::source::SourceName;

pub struct HttpFetcher {
    http: reqwest::Client,
    endpoints: HashMap<SourceName, String>,
    bearer: Option<String>,
}

impl HttpFetcher {
    pub fn new(
        endpoints: HashMap<SourceName, String>,
        bearer: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("idea-pulse/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            http,
            endpoints,
            bearer: bearer.filter(|b| !b.trim().is_empty()),
        })
    }

    pub fn has_endpoint(&self, source: SourceName) -> bool {
        self.endpoints.contains_key(&source)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn invoke(&self, source: SourceName, ctx: &QueryContext) -> Result<Value> {
        let url = self
            .endpoints
            .get(&source)
            .ok_or_else(|| anyhow!("no endpoint configured for source {source}"))?;

        let mut req = self.http.post(url).json(ctx);
        if let Some(token) = &self.bearer {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("{source}: request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("{source}: upstream returned HTTP {status}");
        }
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("{source}: invalid JSON body"))?;

        // Functions report failures in-band as {"error": "..."} with a 200.
        if let Some(err) = upstream_error(&body) {
            bail!("{source}: {err}");
        }
        Ok(body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// An error-only body: `error` present and no payload next to it.
fn upstream_error(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    let err = obj.get("error").filter(|e| !e.is_null())?;
    let has_payload = obj.keys().any(|k| k != "error" && k != "details" && k != "status");
    if has_payload {
        return None;
    }
    Some(match err {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
