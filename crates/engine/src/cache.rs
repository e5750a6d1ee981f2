//! Query cache for backend reads.
//!
//! Entries are keyed by [`QueryKey`] and considered fresh for a fixed stale
//! time. Mutations call [`QueryCache::invalidate`], which marks the entry
//! stale and broadcasts the key so open views can re-fetch.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Machines,
    Machine(i64),
    Parts,
    Part(i64),
    Compatibility,
    Users,
    Backups,
    CustomModels,
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryKey::Machines => f.write_str("machines"),
            QueryKey::Machine(id) => write!(f, "machines/{}", id),
            QueryKey::Parts => f.write_str("parts"),
            QueryKey::Part(id) => write!(f, "parts/{}", id),
            QueryKey::Compatibility => f.write_str("compatibility"),
            QueryKey::Users => f.write_str("users"),
            QueryKey::Backups => f.write_str("backups"),
            QueryKey::CustomModels => f.write_str("custom-models"),
        }
    }
}

struct Entry {
    value: serde_json::Value,
    fetched_at: Instant,
    stale: bool,
}

pub struct QueryCache {
    entries: RwLock<HashMap<QueryKey, Entry>>,
    stale_time: Duration,
    events: broadcast::Sender<QueryKey>,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: RwLock::new(HashMap::new()),
            stale_time,
            events,
        }
    }

    /// Cached value if fresh, otherwise the result of `fetch` (which is then
    /// cached). Fetch errors are returned as-is and leave the entry alone.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.fresh::<T>(&key) {
            tracing::trace!(key = %key, "cache hit");
            return Ok(hit);
        }
        let value = fetch().await?;
        self.put(key, &value);
        Ok(value)
    }

    pub fn put<T: Serialize>(&self, key: QueryKey, value: &T) {
        let Ok(json) = serde_json::to_value(value) else {
            return;
        };
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                key,
                Entry {
                    value: json,
                    fetched_at: Instant::now(),
                    stale: false,
                },
            );
        }
    }

    fn fresh<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key)?;
        if entry.stale || entry.fetched_at.elapsed() >= self.stale_time {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn invalidate(&self, key: QueryKey) {
        if let Ok(mut entries) = self.entries.write() {
            if let Some(entry) = entries.get_mut(&key) {
                entry.stale = true;
            }
        }
        tracing::debug!(key = %key, "query invalidated");
        // No subscribers is fine.
        let _ = self.events.send(key);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.events.subscribe()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
