//! Canned per-source replies for tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::Value;

use super::Fetcher;
use crate::query::QueryContext;
use crate::source::SourceName;

#[derive(Debug, Clone)]
pub enum FixedReply {
    Data(Value),
    Fail(String),
    /// Fail the first `n` calls, then answer with the value.
    FlakyThen(usize, Value),
}

#[derive(Default)]
pub struct FixedFetcher {
    replies: Mutex<HashMap<SourceName, FixedReply>>,
    delays: HashMap<SourceName, Duration>,
    calls: Mutex<HashMap<SourceName, usize>>,
    total: AtomicUsize,
}

impl FixedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, source: SourceName, value: Value) -> Self {
        self.set(source, FixedReply::Data(value));
        self
    }

    pub fn failing(self, source: SourceName, msg: &str) -> Self {
        self.set(source, FixedReply::Fail(msg.to_string()));
        self
    }

    pub fn flaky(self, source: SourceName, failures: usize, value: Value) -> Self {
        self.set(source, FixedReply::FlakyThen(failures, value));
        self
    }

    pub fn delayed(mut self, source: SourceName, d: Duration) -> Self {
        self.delays.insert(source, d);
        self
    }

    /// Swap a reply at runtime (e.g. upstream data changed between refreshes).
    pub fn set(&self, source: SourceName, reply: FixedReply) {
        self.replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(source, reply);
    }

    pub fn calls_for(&self, source: SourceName) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&source)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetcher for FixedFetcher {
    async fn invoke(&self, source: SourceName, _ctx: &QueryContext) -> Result<Value> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let n = {
            let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
            let c = calls.entry(source).or_insert(0);
            *c += 1;
            *c
        };
        // the reply is decided when the call starts; the delay models transit
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&source)
            .cloned();
        if let Some(d) = self.delays.get(&source) {
            tokio::time::sleep(*d).await;
        }
        match reply {
            Some(FixedReply::Data(v)) => Ok(v),
            Some(FixedReply::Fail(msg)) => Err(anyhow!("{source}: {msg}")),
            Some(FixedReply::FlakyThen(failures, v)) => {
                if n <= failures {
                    Err(anyhow!("{source}: transient failure {n}"))
                } else {
                    Ok(v)
                }
            }
            None => Err(anyhow!("{source}: no fixture configured")),
        }
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
