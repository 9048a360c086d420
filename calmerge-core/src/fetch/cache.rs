//! Stale-while-revalidate cache in front of a [`RemoteFetcher`].
//!
//! Entries are JSON `{content, fetched_at}` under `calendar_data_{url}`:
//! - younger than `freshness`: served without touching the network
//! - younger than `max_stale`: refreshed, the cached copy served if the refresh fails
//! - older: refreshed, and a failed refresh is an error
//!
//! Entries without a timestamp (plain strings from older deployments) count as
//! stale but usable.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::config::FetchSettings;
use crate::constants::FEED_CACHE_PREFIX;
use crate::error::FetchError;
use crate::fetch::RemoteFetcher;
use crate::store::CacheStore;

#[derive(Debug, Serialize, Deserialize)]
struct CachedFeed {
    content: String,
    fetched_at: DateTime<Utc>,
}

struct CacheEntry {
    content: String,
    fetched_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct FetchCache {
    store: Arc<dyn CacheStore>,
    remote: Arc<dyn RemoteFetcher>,
    clock: Arc<dyn Clock>,
    freshness: Duration,
    max_stale: Duration,
    default_timeout: Duration,
}

impl FetchCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        remote: Arc<dyn RemoteFetcher>,
        clock: Arc<dyn Clock>,
        settings: &FetchSettings,
    ) -> Self {
        FetchCache {
            store,
            remote,
            clock,
            freshness: settings.freshness(),
            max_stale: settings.max_stale(),
            default_timeout: settings.default_timeout(),
        }
    }

    pub fn cache_key(url: &str) -> String {
        format!("{FEED_CACHE_PREFIX}{url}")
    }

    /// Fetch `url`, failing only when there is no usable cached copy.
    pub async fn fetch(&self, url: &str, timeout: Option<Duration>) -> Result<String, FetchError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let key = Self::cache_key(url);

        let Some(entry) = self.read(&key).await else {
            tracing::debug!(url = %url, "Feed cache miss");
            return self.refresh(url, &key, timeout).await;
        };

        let age = entry
            .fetched_at
            .map(|at| (self.clock.now() - at).to_std().unwrap_or(Duration::ZERO));

        if let Some(age) = age {
            if age < self.freshness {
                tracing::debug!(url = %url, age_secs = age.as_secs(), "Feed cache hit");
                return Ok(entry.content);
            }
        }

        let usable = age.is_none_or(|age| age < self.max_stale);
        match self.refresh(url, &key, timeout).await {
            Ok(content) => Ok(content),
            Err(e) if usable => {
                tracing::warn!(
                    url = %url,
                    age_secs = age.map(|a| a.as_secs()),
                    error = %e,
                    "Refresh failed, serving stale feed"
                );
                Ok(entry.content)
            }
            Err(e) => {
                tracing::warn!(
                    url = %url,
                    error = %e,
                    "Refresh failed and cached feed is too old to serve"
                );
                Err(e)
            }
        }
    }

    async fn refresh(&self, url: &str, key: &str, timeout: Duration) -> Result<String, FetchError> {
        let content = self.remote.fetch(url, timeout).await?;
        self.write(key, &content).await;
        Ok(content)
    }

    async fn read(&self, key: &str) -> Option<CacheEntry> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Feed cache read failed");
                return None;
            }
        };

        Some(match serde_json::from_str::<CachedFeed>(&raw) {
            Ok(cached) => CacheEntry {
                content: cached.content,
                fetched_at: Some(cached.fetched_at),
            },
            Err(_) => CacheEntry {
                content: raw,
                fetched_at: None,
            },
        })
    }

    async fn write(&self, key: &str, content: &str) {
        let entry = CachedFeed {
            content: content.to_string(),
            fetched_at: self.clock.now(),
        };
        let value = match serde_json::to_string(&entry) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize feed cache entry");
                return;
            }
        };
        if let Err(e) = self.store.set(key, value, Some(self.max_stale)).await {
            tracing::warn!(key = %key, error = %e, "Feed cache write failed");
        }
    }
}
