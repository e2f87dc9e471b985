//! Durable per-user tier.
//!
//! [`DurableStore`] is the persistence contract; [`FileStore`] keeps one JSON
//! document per user on disk, written atomically (tmp file + rename).
//!
//! Saves are compare-and-set on [`RequestId`]: a record is only replaced by a
//! write from a request that started no earlier, and `delete` leaves a fence
//! that refuses writes from requests that started before it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{CacheKey, PutOutcome, RequestId};
use crate::tile::NormalizedTileData;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableRecord {
    pub payload: NormalizedTileData,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: RequestId,
}

impl DurableRecord {
    pub fn new(
        payload: NormalizedTileData,
        stored_at: DateTime<Utc>,
        ttl_minutes: u64,
        request: RequestId,
    ) -> Self {
        let ttl = Duration::minutes(ttl_minutes.min(MAX_TTL_MINUTES) as i64);
        Self {
            payload,
            stored_at,
            expires_at: stored_at + ttl,
            session_id: None,
            request_id: request,
        }
    }

    pub fn with_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(str::to_string);
        self
    }
}

#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    /// Unexpired record for this user and key. When `session_id` is given,
    /// records pinned to another session are ignored.
    async fn load(
        &self,
        user_id: &str,
        key: &CacheKey,
        session_id: Option<&str>,
    ) -> Result<Option<DurableRecord>>;

    /// `Stale` when the stored record or a delete fence is newer than
    /// `record.request_id`; nothing is written in that case.
    async fn save(&self, user_id: &str, key: &CacheKey, record: DurableRecord) -> Result<PutOutcome>;

    /// Remove the record and refuse later saves from requests before `fence`.
    async fn delete(&self, user_id: &str, key: &CacheKey, fence: RequestId) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Fence {
    request_id: RequestId,
    until: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserDoc {
    #[serde(default)]
    records: BTreeMap<String, DurableRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fences: BTreeMap<String, Fence>,
}

impl UserDoc {
    fn prune(&mut self, now: DateTime<Utc>) {
        self.records.retain(|_, r| now < r.expires_at);
        self.fences.retain(|_, f| now < f.until);
    }

    /// Newest request already reflected for this key.
    fn high_water(&self, key: &str) -> Option<RequestId> {
        let record = self.records.get(key).map(|r| r.request_id);
        let fence = self.fences.get(key).map(|f| f.request_id);
        record.max(fence)
    }
}

const MAX_TTL_MINUTES: u64 = 60 * 24 * 365;

/// How long a delete keeps refusing older writers.
const FENCE_MINUTES: i64 = 60;

pub struct FileStore {
    dir: PathBuf,
    // serializes read-modify-write of user documents
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating tile store dir {}", dir.display()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(64)
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    async fn read_doc(&self, path: &Path) -> Result<UserDoc> {
        match tokio::fs::read_to_string(path).await {
            Ok(s) => Ok(serde_json::from_str(&s).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserDoc::default()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write_doc(&self, path: &Path, doc: &UserDoc) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec(doc).context("serializing tile store document")?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("renaming into {}", path.display()))?;
        Ok(())
    }

    async fn load_at(
        &self,
        user_id: &str,
        key: &CacheKey,
        session_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<DurableRecord>> {
        let doc = self.read_doc(&self.user_path(user_id)).await?;
        Ok(doc.records.get(&key.to_string()).cloned().filter(|r| {
            let session_ok = match (session_id, r.session_id.as_deref()) {
                (Some(want), Some(have)) => want == have,
                _ => true,
            };
            session_ok && now < r.expires_at
        }))
    }

    async fn save_at(
        &self,
        user_id: &str,
        key: &CacheKey,
        record: DurableRecord,
        now: DateTime<Utc>,
    ) -> Result<PutOutcome> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_path(user_id);
        let mut doc = self.read_doc(&path).await?;
        doc.prune(now);
        let k = key.to_string();
        if doc.high_water(&k).is_some_and(|seen| record.request_id < seen) {
            return Ok(PutOutcome::Stale);
        }
        doc.fences.remove(&k);
        doc.records.insert(k, record);
        self.write_doc(&path, &doc).await?;
        Ok(PutOutcome::Stored)
    }

    async fn delete_at(
        &self,
        user_id: &str,
        key: &CacheKey,
        fence: RequestId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_path(user_id);
        let mut doc = self.read_doc(&path).await?;
        doc.prune(now);
        let k = key.to_string();
        doc.records.remove(&k);
        let request_id = doc.high_water(&k).map_or(fence, |seen| seen.max(fence));
        doc.fences.insert(
            k,
            Fence {
                request_id,
                until: now + Duration::minutes(FENCE_MINUTES),
            },
        );
        self.write_doc(&path, &doc).await
    }
}

#[async_trait::async_trait]
impl DurableStore for FileStore {
    async fn load(
        &self,
        user_id: &str,
        key: &CacheKey,
        session_id: Option<&str>,
    ) -> Result<Option<DurableRecord>> {
        self.load_at(user_id, key, session_id, Utc::now()).await
    }

    async fn save(&self, user_id: &str, key: &CacheKey, record: DurableRecord) -> Result<PutOutcome> {
        self.save_at(user_id, key, record, Utc::now()).await
    }

    async fn delete(&self, user_id: &str, key: &CacheKey, fence: RequestId) -> Result<()> {
        self.delete_at(user_id, key, fence, Utc::now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryContext;

    fn key(tile: &str) -> CacheKey {
        CacheKey::derive(&QueryContext::new("idea", tile))
    }

    fn record(tag: &str, request: u64) -> DurableRecord {
        let mut d = NormalizedTileData::default().ensure_metrics();
        d.insights.push(tag.to_string());
        DurableRecord::new(d, Utc::now(), 30, RequestId(request))
    }

    #[tokio::test]
    async fn save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let rec = record("a", 1);

        let out = store.save("u1", &key("news"), rec.clone()).await.unwrap();
        assert_eq!(out, PutOutcome::Stored);
        let got = store.load("u1", &key("news"), None).await.unwrap().unwrap();
        assert_eq!(got.payload, rec.payload);
        assert_eq!(got.request_id, RequestId(1));
        assert!(store.load("u2", &key("news"), None).await.unwrap().is_none());
        assert!(store.load("u1", &key("reddit"), None).await.unwrap().is_none());

        store.delete("u1", &key("news"), RequestId(2)).await.unwrap();
        assert!(store.load("u1", &key("news"), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_expire_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let t0 = Utc::now();
        let rec = DurableRecord::new(NormalizedTileData::default(), t0, 30, RequestId(1));
        store.save_at("u1", &key("news"), rec, t0).await.unwrap();
        let k = key("news");
        assert!(store.load_at("u1", &k, None, t0 + Duration::minutes(29)).await.unwrap().is_some());
        assert!(store.load_at("u1", &k, None, t0 + Duration::minutes(31)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_pinned_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let rec = record("a", 1).with_session(Some("s1"));
        store.save("u1", &key("news"), rec).await.unwrap();
        assert!(store.load("u1", &key("news"), Some("s1")).await.unwrap().is_some());
        assert!(store.load("u1", &key("news"), Some("s2")).await.unwrap().is_none());
        assert!(store.load("u1", &key("news"), None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn older_request_cannot_replace_newer_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let k = key("news");
        assert_eq!(store.save("u1", &k, record("new", 5)).await.unwrap(), PutOutcome::Stored);
        assert_eq!(store.save("u1", &k, record("old", 3)).await.unwrap(), PutOutcome::Stale);
        let got = store.load("u1", &k, None).await.unwrap().unwrap();
        assert_eq!(got.payload.insights, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn delete_fences_off_earlier_requests() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let k = key("news");
        store.delete("u1", &k, RequestId(10)).await.unwrap();
        assert_eq!(store.save("u1", &k, record("old", 9)).await.unwrap(), PutOutcome::Stale);
        assert!(store.load("u1", &k, None).await.unwrap().is_none());
        assert_eq!(store.save("u1", &k, record("new", 11)).await.unwrap(), PutOutcome::Stored);
        assert!(store.load("u1", &k, None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fences_lapse() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let k = key("news");
        let t0 = Utc::now();
        store.delete_at("u1", &k, RequestId(10), t0).await.unwrap();
        let later = t0 + Duration::minutes(FENCE_MINUTES + 1);
        let rec = DurableRecord::new(NormalizedTileData::default(), later, 30, RequestId(9));
        assert_eq!(store.save_at("u1", &k, rec, later).await.unwrap(), PutOutcome::Stored);
    }

    #[test]
    fn user_ids_are_path_safe() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let p = store.user_path("../etc/passwd");
        assert_eq!(p.parent(), Some(dir.path()));
    }
}
