//! Core of the calmerge ecosystem.
//!
//! This crate combines several remote iCalendar feeds into one merged feed:
//! - `fetch` wraps remote fetching in a stale-while-revalidate cache
//! - `source` turns one configured feed into a customized document
//! - `merge` assembles, deduplicates, annotates and caches the merged output
//!
//! Every collaborator (cache store, calendar records, clock, remote HTTP) is
//! injected, so the engine can run against fakes in tests.

pub mod calendar;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod ics;
pub mod merge;
pub mod source;
pub mod store;

pub use calendar::{CalendarId, Entitlements, MergedCalendar, Source, SourceSettings, Tier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Settings;
pub use error::{CalMergeError, CalMergeResult, FetchError};
pub use merge::{CalendarChange, EdgeCache, MergeEngine, MergeOutput};
