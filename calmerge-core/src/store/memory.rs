use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::error::CalMergeResult;
use crate::store::CacheStore;

struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local cache store with clock-driven expiry.
#[derive(Clone)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        MemoryCacheStore {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries
            .values()
            .filter(|e| e.expires_at.is_none_or(|at| at > now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time-to-live remaining for `key`, if it exists and expires.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let expires_at = entries.get(key)?.expires_at?;
        (expires_at - now).to_std().ok()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CalMergeResult<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());

        match entries.get(key) {
            Some(entry) if entry.expires_at.is_some_and(|at| at <= now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CalMergeResult<()> {
        let now = self.clock.now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl);

        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        // Expired keys are otherwise only dropped when read.
        entries.retain(|_, e| e.expires_at.is_none_or(|at| at > now));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CalMergeResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn store() -> (MemoryCacheStore, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        (MemoryCacheStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_entries_expire_with_clock() {
        let (store, clock) = store();
        store
            .set("k", "v".into(), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(29));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(1)));

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_entries_without_ttl_persist_until_deleted() {
        let (store, clock) = store();
        store.set("k", "v".into(), None).await.unwrap();
        clock.advance(chrono::Duration::days(365));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_sweeps_expired_entries() {
        let (store, clock) = store();
        for key in ["a", "b", "c"] {
            store
                .set(key, "v".into(), Some(Duration::from_secs(10)))
                .await
                .unwrap();
        }
        store.set("pinned", "v".into(), None).await.unwrap();
        assert_eq!(store.entries.lock().unwrap().len(), 4);

        clock.advance(chrono::Duration::seconds(11));
        store
            .set("fresh", "v".into(), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        let entries = store.entries.lock().unwrap();
        let mut keys: Vec<_> = entries.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["fresh", "pinned"]);
    }
}
