//! How long merged output may be cached, server-side and at the edge.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::calendar::MergedCalendar;
use crate::config::MergeSettings;

/// Caching instruction for HTTP intermediaries serving a merged feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeCache {
    /// Recently edited: intermediaries must not cache.
    NoStore,
    /// Lowest tier: cache publicly for `max_age`.
    Public { max_age: Duration },
    /// No explicit header.
    Default,
}

impl EdgeCache {
    pub fn cache_control(&self) -> Option<String> {
        match self {
            EdgeCache::NoStore => Some("no-cache, no-store, must-revalidate".to_string()),
            EdgeCache::Public { max_age } => Some(format!("public, max-age={}", max_age.as_secs())),
            EdgeCache::Default => None,
        }
    }
}

/// True while `calendar` was edited less than `cache_bypass_secs` ago.
///
/// Modification times in the future count as just edited.
pub fn in_bypass_window(
    calendar: &MergedCalendar,
    settings: &MergeSettings,
    now: DateTime<Utc>,
) -> bool {
    (now - calendar.last_modified())
        .to_std()
        .map(|age| age < Duration::from_secs(settings.cache_bypass_secs))
        .unwrap_or(true)
}

/// Server-side lifetime of a merged result.
pub fn server_ttl(
    calendar: &MergedCalendar,
    settings: &MergeSettings,
    now: DateTime<Utc>,
) -> Duration {
    if in_bypass_window(calendar, settings, now) {
        Duration::from_secs(settings.cache_bypass_ttl_secs)
    } else {
        calendar
            .effective_refresh_interval(settings.default_refresh_secs, settings.min_refresh_secs)
    }
}

pub fn edge_cache(
    calendar: &MergedCalendar,
    settings: &MergeSettings,
    now: DateTime<Utc>,
) -> EdgeCache {
    if in_bypass_window(calendar, settings, now) {
        EdgeCache::NoStore
    } else if calendar.owner.is_lowest_tier {
        EdgeCache::Public {
            max_age: Duration::from_secs(settings.free_tier_max_age_secs),
        }
    } else {
        EdgeCache::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Tier;
    use chrono::TimeZone;

    fn calendar(tier: Tier, edited: DateTime<Utc>) -> MergedCalendar {
        let mut calendar = MergedCalendar::new("Team", tier);
        calendar.modified_at = edited;
        calendar.refresh_interval_secs = 7200;
        calendar
    }

    fn edited() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_recent_edit_forces_short_ttl_and_no_store() {
        let settings = MergeSettings::default();
        let cal = calendar(Tier::Business, edited());
        let now = edited() + chrono::Duration::hours(2);

        assert_eq!(server_ttl(&cal, &settings, now), Duration::from_secs(30));
        assert_eq!(edge_cache(&cal, &settings, now), EdgeCache::NoStore);
    }

    #[test]
    fn test_ttl_follows_effective_refresh_interval() {
        let settings = MergeSettings::default();
        let now = edited() + chrono::Duration::hours(4);

        let business = calendar(Tier::Business, edited());
        assert_eq!(server_ttl(&business, &settings, now), Duration::from_secs(7200));
        assert_eq!(edge_cache(&business, &settings, now), EdgeCache::Default);

        let free = calendar(Tier::Free, edited());
        assert_eq!(server_ttl(&free, &settings, now), Duration::from_secs(43_200));
        assert_eq!(
            edge_cache(&free, &settings, now).cache_control().as_deref(),
            Some("public, max-age=43200")
        );
    }

    #[test]
    fn test_source_edit_counts_as_calendar_edit() {
        let settings = MergeSettings::default();
        let mut cal = calendar(Tier::Free, edited());
        let mut source = crate::calendar::Source::new("A", "https://a.example/a.ics");
        source.modified_at = edited() + chrono::Duration::days(1);
        cal.sources.push(source);

        let now = edited() + chrono::Duration::days(1) + chrono::Duration::minutes(5);
        assert!(in_bypass_window(&cal, &settings, now));
    }
}
