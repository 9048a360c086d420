//! Built-in defaults. Every one of these can be overridden through [`crate::Settings`].

/// Fetched feeds younger than this are served without touching the network.
pub const FETCH_FRESHNESS_SECS: u64 = 2 * 60;
/// Cached feeds older than this are too old to serve when a refresh fails.
pub const FETCH_MAX_STALE_SECS: u64 = 7 * 24 * 60 * 60;
pub const FETCH_DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const USER_AGENT: &str = "CalMerge/1.0 (https://calmerge.org)";
pub const ACCEPT: &str = "text/calendar, application/calendar+xml, application/calendar+json";
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Wall-clock budget for a whole merge pass.
pub const MAX_TOTAL_TIMEOUT_SECS: u64 = 60;
pub const SAFETY_BUFFER_SECS: u64 = 5;
pub const MIN_PER_SOURCE_TIMEOUT_SECS: u64 = 5;

/// Twelve hours.
pub const DEFAULT_REFRESH_SECS: u64 = 43_200;
pub const MIN_REFRESH_SECS: u64 = 3_600;
/// Window after an edit during which merged output is barely cached.
pub const CACHE_BYPASS_SECS: u64 = 3 * 60 * 60;
pub const CACHE_BYPASS_TTL_SECS: u64 = 30;
pub const FREE_TIER_MAX_AGE_SECS: u64 = 43_200;

pub const SITE_URL: &str = "https://calmerge.org";
pub const PRODUCT_NAME: &str = "CalMerge";

pub const MEETUP_API_BASE_URL: &str = "https://api.meetup.com";
pub const MEETUP_TIMEOUT_SECS: u64 = 10;
/// Timeout used when checking a single feed outside of a merge.
pub const CHECK_FEED_TIMEOUT_SECS: u64 = 10;

pub const DOMAIN_CONFIG_KEY_ENV: &str = "CALENDAR_CONFIG_KEY";

pub const FEED_CACHE_PREFIX: &str = "calendar_data_";
pub const MERGED_CACHE_PREFIX: &str = "calendar_str_";
