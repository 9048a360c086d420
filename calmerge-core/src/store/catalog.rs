//! Calendar record sources: a TOML catalog on disk, or records held in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarId, Entitlements, MergedCalendar, Source, Tier};
use crate::constants::DEFAULT_REFRESH_SECS;
use crate::error::{CalMergeError, CalMergeResult};
use crate::store::CalendarRepository;

/// Calendars kept in memory, in insertion order.
#[derive(Clone, Default)]
pub struct InMemoryCalendarRepository {
    calendars: Arc<RwLock<Vec<MergedCalendar>>>,
}

impl InMemoryCalendarRepository {
    pub fn new(calendars: impl IntoIterator<Item = MergedCalendar>) -> Self {
        InMemoryCalendarRepository {
            calendars: Arc::new(RwLock::new(calendars.into_iter().collect())),
        }
    }

    /// Insert or replace a calendar by id.
    pub fn upsert(&self, calendar: MergedCalendar) {
        let mut calendars = self.calendars.write().unwrap_or_else(|p| p.into_inner());
        match calendars.iter_mut().find(|c| c.id == calendar.id) {
            Some(existing) => *existing = calendar,
            None => calendars.push(calendar),
        }
    }

    pub fn remove(&self, id: CalendarId) -> Option<MergedCalendar> {
        let mut calendars = self.calendars.write().unwrap_or_else(|p| p.into_inner());
        let index = calendars.iter().position(|c| c.id == id)?;
        Some(calendars.remove(index))
    }
}

#[async_trait]
impl CalendarRepository for InMemoryCalendarRepository {
    async fn get(&self, id: CalendarId) -> CalMergeResult<Option<MergedCalendar>> {
        let calendars = self.calendars.read().unwrap_or_else(|p| p.into_inner());
        Ok(calendars.iter().find(|c| c.id == id).cloned())
    }

    async fn all(&self) -> CalMergeResult<Vec<MergedCalendar>> {
        let calendars = self.calendars.read().unwrap_or_else(|p| p.into_inner());
        Ok(calendars.clone())
    }
}

/// On-disk catalog file:
///
/// ```toml
/// [[calendars]]
/// id = "6f2c0d1e-8a3b-4c5d-9e7f-0a1b2c3d4e5f"
/// name = "Team"
/// tier = "business"
///
/// [[calendars.sources]]
/// name = "Holidays"
/// url = "https://example.com/holidays.ics"
/// custom_prefix = "Off"
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    #[serde(default)]
    calendars: Vec<CalendarRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CalendarRecord {
    id: CalendarId,
    name: String,
    /// Owner tier; ignored when `owner` flags are given explicitly.
    #[serde(default)]
    tier: Option<Tier>,
    #[serde(default)]
    owner: Option<Entitlements>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    refresh_interval_secs: Option<u64>,
    #[serde(default)]
    remove_branding: bool,
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
}

impl From<CalendarRecord> for MergedCalendar {
    fn from(record: CalendarRecord) -> Self {
        let owner = record
            .owner
            .unwrap_or_else(|| record.tier.unwrap_or_default().entitlements());

        let mut calendar = MergedCalendar::new(record.name, owner);
        calendar.id = record.id;
        if let Some(timezone) = record.timezone {
            calendar.timezone = timezone;
        }
        calendar.refresh_interval_secs =
            record.refresh_interval_secs.unwrap_or(DEFAULT_REFRESH_SECS);
        calendar.remove_branding = record.remove_branding;
        calendar.sources = record.sources;
        calendar.modified_at = record.modified_at.unwrap_or(DateTime::UNIX_EPOCH);
        calendar
    }
}

/// Reads calendars from a TOML catalog, re-reading the file on every lookup
/// so edits made by the owning service are picked up without a restart.
#[derive(Debug, Clone)]
pub struct TomlCalendarRepository {
    path: PathBuf,
}

impl TomlCalendarRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TomlCalendarRepository { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> CalMergeResult<Vec<MergedCalendar>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let catalog: Catalog =
            toml::from_str(&content).map_err(|e| CalMergeError::Config(e.to_string()))?;

        let mut seen: HashMap<CalendarId, usize> = HashMap::new();
        let mut calendars = Vec::with_capacity(catalog.calendars.len());
        for record in catalog.calendars {
            let calendar = MergedCalendar::from(record);
            if let Some(&index) = seen.get(&calendar.id) {
                tracing::warn!(
                    calendar = %calendar.id,
                    "Duplicate calendar id in catalog, keeping the last entry"
                );
                calendars[index] = calendar;
            } else {
                seen.insert(calendar.id, calendars.len());
                calendars.push(calendar);
            }
        }
        Ok(calendars)
    }
}

#[async_trait]
impl CalendarRepository for TomlCalendarRepository {
    async fn get(&self, id: CalendarId) -> CalMergeResult<Option<MergedCalendar>> {
        Ok(self.load()?.into_iter().find(|c| c.id == id))
    }

    async fn all(&self) -> CalMergeResult<Vec<MergedCalendar>> {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeSettings;
    use crate::merge::{EdgeCache, edge_cache, in_bypass_window, server_ttl};
    use std::time::Duration;

    const CATALOG: &str = r#"
[[calendars]]
id = "6f2c0d1e-8a3b-4c5d-9e7f-0a1b2c3d4e5f"
name = "Team"
tier = "business"
refresh_interval_secs = 7200

[[calendars.sources]]
name = "Holidays"
url = "https://example.com/holidays.ics"
include_location = false
custom_prefix = "Off"

[[calendars.sources]]
name = "Sports"
url = "https://example.com/sports.ics"

[[calendars]]
id = "0b7e4a52-1111-4c5d-9e7f-0a1b2c3d4e5f"
name = "Family"
"#;

    #[tokio::test]
    async fn test_toml_catalog_maps_tier_and_sources() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("calendars.toml");
        std::fs::write(&path, CATALOG).expect("Should write catalog");

        let repo = TomlCalendarRepository::new(&path);
        let all = repo.all().await.expect("Should load catalog");
        assert_eq!(all.len(), 2);

        let team = &all[0];
        assert_eq!(team.name, "Team");
        assert!(team.owner.can_customize_sources);
        assert_eq!(team.refresh_interval_secs, 7200);
        assert_eq!(team.sources.len(), 2);
        assert_eq!(team.sources[0].settings.custom_prefix, "Off");
        assert!(!team.sources[0].settings.include_location);
        assert!(team.sources[1].settings.is_default());

        let family = repo
            .get("0b7e4a52-1111-4c5d-9e7f-0a1b2c3d4e5f".parse().unwrap())
            .await
            .unwrap()
            .expect("Should find calendar");
        assert!(family.owner.is_lowest_tier, "Tier defaults to free");
        assert_eq!(family.timezone, "America/New_York");
    }

    #[tokio::test]
    async fn test_catalog_without_edit_times_uses_refresh_interval() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("calendars.toml");
        std::fs::write(&path, CATALOG).expect("Should write catalog");

        let all = TomlCalendarRepository::new(&path).all().await.unwrap();
        let (team, family) = (&all[0], &all[1]);
        let settings = MergeSettings::default();
        let now = Utc::now();

        assert!(!in_bypass_window(team, &settings, now));
        assert_eq!(server_ttl(team, &settings, now), Duration::from_secs(7200));
        assert_eq!(
            edge_cache(family, &settings, now),
            EdgeCache::Public {
                max_age: Duration::from_secs(43_200)
            }
        );

        // Reloading does not make the records look freshly edited.
        let again = TomlCalendarRepository::new(&path).all().await.unwrap();
        assert_eq!(again[0].last_modified(), team.last_modified());
    }

    #[tokio::test]
    async fn test_explicit_edit_time_is_kept() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("calendars.toml");
        std::fs::write(
            &path,
            "[[calendars]]\nid = \"6f2c0d1e-8a3b-4c5d-9e7f-0a1b2c3d4e5f\"\n\
             name = \"Team\"\nmodified_at = \"2025-04-01T12:00:00Z\"\n",
        )
        .expect("Should write catalog");

        let all = TomlCalendarRepository::new(&path).all().await.unwrap();
        assert_eq!(all[0].modified_at.to_rfc3339(), "2025-04-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_missing_catalog_is_empty() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let repo = TomlCalendarRepository::new(dir.path().join("missing.toml"));
        assert!(repo.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_upsert_replaces_by_id() {
        let cal = MergedCalendar::new("One", Tier::Free);
        let id = cal.id;
        let repo = InMemoryCalendarRepository::new([cal]);

        let mut renamed = repo.get(id).await.unwrap().unwrap();
        renamed.name = "Renamed".into();
        repo.upsert(renamed);

        assert_eq!(repo.all().await.unwrap().len(), 1);
        assert_eq!(repo.get(id).await.unwrap().unwrap().name, "Renamed");
        assert!(repo.remove(id).is_some());
        assert!(repo.get(id).await.unwrap().is_none());
    }
}
