//! Durable tier in front of the ephemeral one.
//!
//! `get`: durable (eligible scopes only) → ephemeral → miss.
//! `put`: ephemeral always, durable too when the scope has a user id. When
//! the durable tier refuses the write as stale, the ephemeral copy is rolled
//! back. Durable failures are logged and the ephemeral tier carries on alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{
    CacheEntry, CacheKey, CacheScope, DurableRecord, DurableStore, MemoryCache, PutOutcome, RequestId,
    TileCache,
};
use crate::telemetry::anon_hash;
use crate::tile::NormalizedTileData;

pub struct TieredCache {
    memory: MemoryCache,
    durable: Option<Arc<dyn DurableStore>>,
}

impl TieredCache {
    pub fn new(memory: MemoryCache, durable: Option<Arc<dyn DurableStore>>) -> Self {
        Self { memory, durable }
    }

    pub fn memory_only(ttl: Duration) -> Self {
        Self::new(MemoryCache::new(ttl), None)
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    fn ttl_minutes(&self) -> u64 {
        self.memory.ttl().as_secs().div_ceil(60).max(1)
    }

    fn durable_for<'a>(&'a self, scope: &'a CacheScope) -> Option<(&'a dyn DurableStore, &'a str)> {
        let store = self.durable.as_deref()?;
        let user = scope.durable_user()?;
        Some((store, user))
    }
}

#[async_trait::async_trait]
impl TileCache for TieredCache {
    fn begin(&self) -> RequestId {
        self.memory.next_request()
    }

    async fn get(&self, key: &CacheKey, scope: &CacheScope) -> Option<CacheEntry> {
        if let Some((store, user)) = self.durable_for(scope) {
            match store.load(user, key, scope.session_id.as_deref()).await {
                Ok(Some(rec)) => {
                    return Some(CacheEntry {
                        key: key.clone(),
                        payload: rec.payload,
                        stored_at: rec.stored_at,
                        request_id: rec.request_id,
                    })
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(target: "cache", user = %anon_hash(user), error = %e, "durable load failed");
                }
            }
        }
        self.memory.lookup(key)
    }

    async fn put_at(
        &self,
        key: &CacheKey,
        payload: NormalizedTileData,
        request: RequestId,
        stored_at: DateTime<Utc>,
        scope: &CacheScope,
    ) -> PutOutcome {
        let durable_copy = self.durable_for(scope).map(|_| payload.clone());
        let outcome = self.memory.store_stamped(key, payload, request, stored_at);
        if outcome == PutOutcome::Stale {
            return outcome;
        }
        if let (Some((store, user)), Some(payload)) = (self.durable_for(scope), durable_copy) {
            let record = DurableRecord::new(payload, stored_at, self.ttl_minutes(), request)
                .with_session(scope.session_id.as_deref());
            match store.save(user, key, record).await {
                Ok(PutOutcome::Stored) => {}
                Ok(PutOutcome::Stale) => {
                    self.memory.discard(key, request);
                    debug!(target: "cache", user = %anon_hash(user), "durable tier holds a newer write");
                    return PutOutcome::Stale;
                }
                Err(e) => {
                    warn!(target: "cache", user = %anon_hash(user), error = %e, "durable save failed");
                }
            }
        }
        outcome
    }

    async fn invalidate(&self, key: &CacheKey, scope: &CacheScope) {
        let fence = self.memory.remove(key);
        if let Some((store, user)) = self.durable_for(scope) {
            if let Err(e) = store.delete(user, key, fence).await {
                warn!(target: "cache", user = %anon_hash(user), error = %e, "durable delete failed");
            }
        }
    }
}
