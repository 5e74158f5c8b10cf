//! Versioned cache generations.
//!
//! `CacheStorage` maps generation names to `Cache`s, each of which maps a
//! request key (URL without fragment) to an immutable response snapshot.
//! Every operation is counted so callers can assert that a code path never
//! touched the store.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Result, ServiceWorkerError};
use crate::fetch::{cache_key, Response};

/// A cached request/response pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL (fragment stripped).
    pub url: Url,

    /// Request method.
    pub method: String,

    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Snapshot a response for `url`.
    pub fn from_response(url: &Url, response: &Response) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            url,
            method: "GET".to_string(),
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: now_millis(),
        }
    }

    /// Key the entry is stored under.
    pub fn key(&self) -> String {
        self.url.to_string()
    }

    /// Rebuild a response from the snapshot.
    pub fn to_response(&self) -> Response {
        Response {
            url: self.url.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            from_cache: true,
        }
    }
}

/// One cache generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    pub name: String,
    entries: HashMap<String, CacheEntry>,
}

impl Cache {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request key.
    pub fn match_request(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key(), entry);
    }

    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Operation counters for a `CacheStorage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub reads: u64,
    pub writes: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.reads + self.writes
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    caches: Vec<Cache>,
}

/// Cache storage (the `caches` global), shared by every worker of an origin.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl CacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a generation, creating it if absent.
    pub async fn open(&self, name: &str) {
        let mut caches = self.caches.write().await;
        if !caches.contains_key(name) {
            self.count_write();
            debug!(cache = name, "Creating cache generation");
            caches.insert(name.to_string(), Cache::new(name));
        } else {
            self.count_read();
        }
    }

    /// Check if a generation exists.
    pub async fn has(&self, name: &str) -> bool {
        self.count_read();
        self.caches.read().await.contains_key(name)
    }

    /// Delete a generation.
    pub async fn delete(&self, name: &str) -> bool {
        self.count_write();
        self.caches.write().await.remove(name).is_some()
    }

    /// All generation names, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.count_read();
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up `url` in one generation.
    pub async fn match_in(&self, name: &str, url: &Url) -> Option<CacheEntry> {
        self.count_read();
        let key = cache_key(url);
        let hit = self
            .caches
            .read()
            .await
            .get(name)
            .and_then(|cache| cache.match_request(&key))
            .cloned();
        trace!(cache = name, key = %key, hit = hit.is_some(), "Cache lookup");
        hit
    }

    /// Store one entry, creating the generation if needed.
    pub async fn put(&self, name: &str, entry: CacheEntry) {
        self.count_write();
        trace!(cache = name, key = %entry.url, "Cache put");
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
            .put(entry);
    }

    /// Store a batch of entries under a single write lock, so readers see
    /// either none or all of them.
    pub async fn put_all(&self, name: &str, entries: Vec<CacheEntry>) {
        self.count_write();
        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        for entry in entries {
            cache.put(entry);
        }
    }

    /// Remove one entry from a generation.
    pub async fn delete_entry(&self, name: &str, url: &Url) -> bool {
        self.count_write();
        let key = cache_key(url);
        self.caches
            .write()
            .await
            .get_mut(name)
            .map(|cache| cache.delete(&key))
            .unwrap_or(false)
    }

    /// Keys stored in a generation (empty if it does not exist).
    pub async fn entry_keys(&self, name: &str) -> Vec<String> {
        self.count_read();
        self.caches
            .read()
            .await
            .get(name)
            .map(Cache::keys)
            .unwrap_or_default()
    }

    /// Operation counters since creation.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Persist every generation to a JSON file.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let snapshot = {
            let caches = self.caches.read().await;
            let mut caches: Vec<Cache> = caches.values().cloned().collect();
            caches.sort_by(|a, b| a.name.cmp(&b.name));
            Snapshot { caches }
        };
        let json = serde_json::to_vec(&snapshot).map_err(|e| ServiceWorkerError::cache(e.to_string()))?;
        tokio::fs::write(path.as_ref(), json)
            .await
            .map_err(|e| ServiceWorkerError::cache(e.to_string()))?;
        debug!(path = %path.as_ref().display(), generations = snapshot.caches.len(), "Cache storage saved");
        Ok(())
    }

    /// Restore storage previously written by [`CacheStorage::save`].
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref())
            .await
            .map_err(|e| ServiceWorkerError::cache(e.to_string()))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&bytes).map_err(|e| ServiceWorkerError::cache(e.to_string()))?;
        let caches = snapshot
            .caches
            .into_iter()
            .map(|cache| (cache.name.clone(), cache))
            .collect();
        Ok(Self {
            caches: RwLock::new(caches),
            ..Self::default()
        })
    }

    fn count_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
