//! Tile cache: an ephemeral in-process tier plus an optional durable
//! per-user tier, both reached through [`TileCache`].
//!
//! Entries live for [`DEFAULT_TTL`] from `stored_at`. Expiry is lazy: `get`
//! reports a miss for an old entry, which stays in place until it is
//! overwritten, invalidated or swept. Writes carry a [`RequestId`]; a write
//! from a request that started before the latest invalidation (or before the
//! entry currently stored) is rejected as [`PutOutcome::Stale`] by both tiers.

pub mod durable;
pub mod memory;
pub mod tiered;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::query::QueryContext;
use crate::tile::NormalizedTileData;

pub use durable::{DurableRecord, DurableStore, FileStore};
pub use memory::MemoryCache;
pub use tiered::TieredCache;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// `(tile type, normalized idea, filters hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub tile_type: String,
    pub idea: String,
    pub filters_hash: String,
}

impl CacheKey {
    pub fn derive(ctx: &QueryContext) -> Self {
        let mut filters: BTreeMap<&str, String> = BTreeMap::new();
        if let Some(v) = ctx.industry.as_deref() {
            filters.insert("industry", fold(v));
        }
        if let Some(v) = ctx.geography.as_deref() {
            filters.insert("geography", fold(v));
        }
        if let Some(w) = ctx.time_window {
            filters.insert("timeWindow", w.as_str().to_string());
        }
        filters.retain(|_, v| !v.is_empty());

        Self {
            tile_type: fold(&ctx.tile_type),
            idea: fold(&ctx.idea_text),
            filters_hash: filters_hash(&filters),
        }
    }

    /// Derive from a loose JSON object (camelCase or snake_case fields, any
    /// key order). `None` when it cannot name a tile and an idea.
    pub fn from_json(v: &Value) -> Option<Self> {
        let ctx: QueryContext = serde_json::from_value(v.clone()).ok().or_else(|| {
            let s = |a: &str, b: &str| {
                v.get(a)
                    .or_else(|| v.get(b))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            Some(QueryContext {
                idea_text: s("ideaText", "idea_text")?,
                tile_type: s("tileType", "tile_type")?,
                industry: s("industry", "industry"),
                geography: s("geography", "geography"),
                time_window: v
                    .get("timeWindow")
                    .or_else(|| v.get("time_window"))
                    .and_then(|w| serde_json::from_value(w.clone()).ok()),
            })
        })?;
        let ctx = ctx.validate().ok()?;
        Some(Self::derive(&ctx))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.tile_type, self.idea, self.filters_hash)
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn filters_hash(filters: &BTreeMap<&str, String>) -> String {
    let canonical = serde_json::to_string(filters).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Monotonic id assigned when a request starts.
///
/// Ids are wall-clock microseconds, bumped past the last id handed out, so
/// ids from instances sharing a durable store order roughly by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RequestId(pub u64);

#[derive(Debug, Default)]
pub struct RequestClock {
    last: AtomicU64,
}

impl RequestClock {
    pub fn next(&self) -> RequestId {
        let wall = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        let bump = |last: u64| wall.max(last.saturating_add(1));
        let prev = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(bump(last)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        RequestId(bump(prev))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: NormalizedTileData,
    pub stored_at: DateTime<Utc>,
    pub request_id: RequestId,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.stored_at).to_std() {
            Ok(age) => age < ttl,
            // stored "in the future" (clock skew): treat as fresh
            Err(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    Stale,
}

/// Who is asking. Only scopes with a user id are eligible for the durable tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheScope {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
}

impl CacheScope {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn durable_user(&self) -> Option<&str> {
        self.user_id.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

/// Cache capability injected into the pipeline.
#[async_trait::async_trait]
pub trait TileCache: Send + Sync {
    /// Start a request; its id orders writes for the staleness guard.
    fn begin(&self) -> RequestId;
    async fn get(&self, key: &CacheKey, scope: &CacheScope) -> Option<CacheEntry>;
    async fn put(
        &self,
        key: &CacheKey,
        payload: NormalizedTileData,
        request: RequestId,
        scope: &CacheScope,
    ) -> PutOutcome {
        self.put_at(key, payload, request, Utc::now(), scope).await
    }
    /// Like `put`, keeping a caller-supplied `stored_at` so amending an
    /// entry does not extend its lifetime.
    async fn put_at(
        &self,
        key: &CacheKey,
        payload: NormalizedTileData,
        request: RequestId,
        stored_at: DateTime<Utc>,
        scope: &CacheScope,
    ) -> PutOutcome;
    /// Completes before returning; later `get`s miss until the next `put`.
    async fn invalidate(&self, key: &CacheKey, scope: &CacheScope);
}
