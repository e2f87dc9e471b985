//! Ephemeral tier: process-local map behind an `RwLock`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{
    CacheEntry, CacheKey, CacheScope, PutOutcome, RequestClock, RequestId, TileCache, DEFAULT_TTL,
};
use crate::tile::NormalizedTileData;

#[derive(Debug, Default)]
struct Slot {
    entry: Option<CacheEntry>,
    /// Writes from requests older than this are stale.
    watermark: RequestId,
    /// When the watermark was last raised by an invalidation.
    fenced_at: Option<DateTime<Utc>>,
}

impl Slot {
    /// A fresh entry, or a fence recent enough that a request it blocks may
    /// still be running.
    fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let entry = self.entry.as_ref().is_some_and(|e| e.is_fresh(now, ttl));
        let fence = self
            .fenced_at
            .is_some_and(|at| (now - at).to_std().map_or(true, |age| age < ttl));
        entry || fence
    }
}

/// Every this many writes, expired slots are swept.
const SWEEP_EVERY: u64 = 256;

#[derive(Debug)]
pub struct MemoryCache {
    ttl: Duration,
    clock: RequestClock,
    writes: AtomicU64,
    slots: RwLock<HashMap<CacheKey, Slot>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            clock: RequestClock::default(),
            writes: AtomicU64::new(0),
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn next_request(&self) -> RequestId {
        self.clock.next()
    }

    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lookup_at(key, Utc::now())
    }

    /// Lazy expiry: an expired entry is reported as a miss but left in place.
    pub fn lookup_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        let slots = self.slots.read().ok()?;
        slots
            .get(key)
            .and_then(|s| s.entry.as_ref())
            .filter(|e| e.is_fresh(now, self.ttl))
            .cloned()
    }

    pub fn store(&self, key: &CacheKey, payload: NormalizedTileData, request: RequestId) -> PutOutcome {
        self.store_at(key, payload, request, Utc::now())
    }

    pub fn store_at(
        &self,
        key: &CacheKey,
        payload: NormalizedTileData,
        request: RequestId,
        now: DateTime<Utc>,
    ) -> PutOutcome {
        self.insert(key, payload, request, now, now)
    }

    /// Store with an earlier `stored_at`, leaving the expiry where it was.
    pub fn store_stamped(
        &self,
        key: &CacheKey,
        payload: NormalizedTileData,
        request: RequestId,
        stored_at: DateTime<Utc>,
    ) -> PutOutcome {
        self.insert(key, payload, request, stored_at, Utc::now())
    }

    fn insert(
        &self,
        key: &CacheKey,
        payload: NormalizedTileData,
        request: RequestId,
        stored_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> PutOutcome {
        let Ok(mut slots) = self.slots.write() else {
            return PutOutcome::Stale;
        };
        if self.writes.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            sweep_slots(&mut slots, now, self.ttl);
        }
        let slot = slots.entry(key.clone()).or_default();
        if request < slot.watermark {
            return PutOutcome::Stale;
        }
        if let Some(existing) = &slot.entry {
            if request < existing.request_id {
                return PutOutcome::Stale;
            }
        }
        slot.entry = Some(CacheEntry {
            key: key.clone(),
            payload,
            stored_at,
            request_id: request,
        });
        PutOutcome::Stored
    }

    /// Drop the entry and fence off every request that started before now.
    /// Returns the fence so other tiers can apply the same one.
    pub fn remove(&self, key: &CacheKey) -> RequestId {
        let fence = self.clock.next();
        if let Ok(mut slots) = self.slots.write() {
            let slot = slots.entry(key.clone()).or_default();
            slot.entry = None;
            slot.watermark = slot.watermark.max(fence);
            slot.fenced_at = Some(Utc::now());
        }
        fence
    }

    /// Drop the entry only if `request` is still the one that wrote it.
    pub fn discard(&self, key: &CacheKey, request: RequestId) {
        if let Ok(mut slots) = self.slots.write() {
            if let Some(slot) = slots.get_mut(key) {
                if slot.entry.as_ref().is_some_and(|e| e.request_id == request) {
                    slot.entry = None;
                }
            }
        }
    }

    /// Remove expired entries and lapsed fences. Returns how many slots went.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.slots
            .write()
            .map(|mut slots| sweep_slots(&mut slots, now, self.ttl))
            .unwrap_or(0)
    }

    /// Slots held, including fences left by invalidation.
    pub fn slot_count(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Entries physically held, expired or not.
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .map(|s| s.values().filter(|slot| slot.entry.is_some()).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep_slots(slots: &mut HashMap<CacheKey, Slot>, now: DateTime<Utc>, ttl: Duration) -> usize {
    let before = slots.len();
    slots.retain(|_, slot| slot.is_live(now, ttl));
    before - slots.len()
}

#[async_trait::async_trait]
impl TileCache for MemoryCache {
    fn begin(&self) -> RequestId {
        self.next_request()
    }

    async fn get(&self, key: &CacheKey, _scope: &CacheScope) -> Option<CacheEntry> {
        self.lookup(key)
    }

    async fn put_at(
        &self,
        key: &CacheKey,
        payload: NormalizedTileData,
        request: RequestId,
        stored_at: DateTime<Utc>,
        _scope: &CacheScope,
    ) -> PutOutcome {
        self.store_stamped(key, payload, request, stored_at)
    }

    async fn invalidate(&self, key: &CacheKey, _scope: &CacheScope) {
        self.remove(key);
    }
}
