//! Merged calendar and source records.
//!
//! These are the already-validated records handed to the engine by the
//! account/persistence side. The engine never enforces authorization; it only
//! reads the entitlement flags carried on each calendar.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::DEFAULT_REFRESH_SECS;

/// Stable identity of a merged calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarId(pub Uuid);

impl CalendarId {
    pub fn new() -> Self {
        CalendarId(Uuid::new_v4())
    }
}

impl Default for CalendarId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CalendarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CalendarId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(CalendarId)
    }
}

/// Subscription tier of a calendar owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Free,
    Personal,
    Business,
    Supporter,
}

impl Tier {
    pub fn entitlements(self) -> Entitlements {
        let premium = matches!(self, Tier::Business | Tier::Supporter);
        Entitlements {
            can_customize_sources: premium,
            can_set_refresh_interval: premium,
            can_remove_branding: premium,
            is_lowest_tier: self == Tier::Free,
        }
    }
}

/// Capability flags of the calendar owner, as evaluated by the account side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entitlements {
    pub can_customize_sources: bool,
    pub can_set_refresh_interval: bool,
    pub can_remove_branding: bool,
    pub is_lowest_tier: bool,
}

impl From<Tier> for Entitlements {
    fn from(tier: Tier) -> Self {
        tier.entitlements()
    }
}

/// Per-source customization as stored. Only honored when the owner may customize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub include_title: bool,
    pub include_description: bool,
    pub include_location: bool,
    pub custom_prefix: String,
    /// Comma-separated keywords; matching titles are dropped.
    pub exclude_keywords: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        SourceSettings {
            include_title: true,
            include_description: true,
            include_location: true,
            custom_prefix: String::new(),
            exclude_keywords: String::new(),
        }
    }
}

impl SourceSettings {
    /// Lower-cased, trimmed, non-empty exclusion keywords.
    pub fn keywords(&self) -> Vec<String> {
        self.exclude_keywords
            .split(',')
            .map(|kw| kw.trim().to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect()
    }

    pub fn prefix(&self) -> Option<&str> {
        let prefix = self.custom_prefix.trim();
        (!prefix.is_empty()).then_some(prefix)
    }

    pub fn is_default(&self) -> bool {
        *self == SourceSettings::default()
    }
}

/// One feed belonging to a merged calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(flatten)]
    pub settings: SourceSettings,
    #[serde(default = "never_modified")]
    pub modified_at: DateTime<Utc>,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Source {
            name: name.into(),
            url: url.into(),
            settings: SourceSettings::default(),
            modified_at: Utc::now(),
        }
    }

    pub fn with_settings(mut self, settings: SourceSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// A merged calendar owned by a single account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedCalendar {
    pub id: CalendarId,
    pub name: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_refresh_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default)]
    pub remove_branding: bool,
    #[serde(default)]
    pub owner: Entitlements,
    /// Ordered; earlier sources win deduplication.
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default = "never_modified")]
    pub modified_at: DateTime<Utc>,
}

/// Records stored without an edit time count as long settled.
fn never_modified() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}

impl MergedCalendar {
    pub fn new(name: impl Into<String>, owner: impl Into<Entitlements>) -> Self {
        MergedCalendar {
            id: CalendarId::new(),
            name: name.into(),
            timezone: default_timezone(),
            refresh_interval_secs: DEFAULT_REFRESH_SECS,
            remove_branding: false,
            owner: owner.into(),
            sources: Vec::new(),
            modified_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    /// Refresh interval honoring the owner's entitlement and the floor.
    pub fn effective_refresh_interval(&self, default_secs: u64, min_secs: u64) -> Duration {
        let secs = if self.owner.can_set_refresh_interval {
            self.refresh_interval_secs.max(min_secs)
        } else {
            default_secs
        };
        Duration::from_secs(secs)
    }

    pub fn show_branding(&self) -> bool {
        !(self.remove_branding && self.owner.can_remove_branding)
    }

    /// Latest edit to the calendar or any of its sources.
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.sources
            .iter()
            .map(|s| s.modified_at)
            .fold(self.modified_at, |latest, m| latest.max(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_premium_tiers_unlock_everything() {
        for tier in [Tier::Business, Tier::Supporter] {
            let e = tier.entitlements();
            assert!(e.can_customize_sources && e.can_set_refresh_interval && e.can_remove_branding);
            assert!(!e.is_lowest_tier);
        }
        let free = Tier::Free.entitlements();
        assert!(free.is_lowest_tier);
        assert!(!free.can_customize_sources);
        assert!(!Tier::Personal.entitlements().can_customize_sources);
    }

    #[test]
    fn test_refresh_interval_clamped_to_default_without_entitlement() {
        let mut cal = MergedCalendar::new("Team", Tier::Personal);
        cal.refresh_interval_secs = 7200;
        assert_eq!(
            cal.effective_refresh_interval(43200, 3600),
            Duration::from_secs(43200)
        );

        cal.owner = Tier::Business.into();
        assert_eq!(cal.effective_refresh_interval(43200, 3600), Duration::from_secs(7200));

        cal.refresh_interval_secs = 60;
        assert_eq!(cal.effective_refresh_interval(43200, 3600), Duration::from_secs(3600));
    }

    #[test]
    fn test_branding_removal_requires_entitlement() {
        let mut cal = MergedCalendar::new("Mine", Tier::Personal);
        cal.remove_branding = true;
        assert!(cal.show_branding());
        cal.owner = Tier::Business.into();
        assert!(!cal.show_branding());
    }

    #[test]
    fn test_keywords_are_trimmed_and_lowercased() {
        let settings = SourceSettings {
            exclude_keywords: " Lunch, ,CANCELLED ,".into(),
            ..SourceSettings::default()
        };
        assert_eq!(settings.keywords(), vec!["lunch", "cancelled"]);
    }

    #[test]
    fn test_last_modified_includes_sources() {
        let mut cal = MergedCalendar::new("Mine", Tier::Free);
        cal.modified_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut source = Source::new("A", "https://a.example/a.ics");
        source.modified_at = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let cal = cal.with_source(source);
        assert_eq!(cal.last_modified(), Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
    }
}
