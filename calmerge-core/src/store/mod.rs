//! Injected storage collaborators: the shared key/value cache and the
//! calendar records the engine reads.

mod catalog;
mod memory;

pub use catalog::{InMemoryCalendarRepository, TomlCalendarRepository};
pub use memory::MemoryCacheStore;

use std::time::Duration;

use async_trait::async_trait;

use crate::calendar::{CalendarId, MergedCalendar};
use crate::error::CalMergeResult;

/// Shared, externally owned key/value cache.
///
/// Implementations must be safe for concurrent use from several merges; the
/// engine never locks around get/set and last write wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CalMergeResult<Option<String>>;

    /// Store `value` under `key`. `ttl` of `None` keeps the entry until evicted.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> CalMergeResult<()>;

    async fn delete(&self, key: &str) -> CalMergeResult<()>;
}

/// Read access to merged calendar records owned by the persistence side.
#[async_trait]
pub trait CalendarRepository: Send + Sync {
    async fn get(&self, id: CalendarId) -> CalMergeResult<Option<MergedCalendar>>;

    async fn all(&self) -> CalMergeResult<Vec<MergedCalendar>>;
}
