//! Assembly of merged calendars, with caching and eviction on edits.

mod assemble;
mod engine;
mod policy;

pub use assemble::{AssemblyStats, assemble};
pub use engine::MergeEngine;
pub use policy::{EdgeCache, edge_cache, in_bypass_window, server_ttl};

use serde::{Deserialize, Serialize};

use crate::calendar::CalendarId;

/// An edit on the persistence side that makes a cached merge stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "calendar", rename_all = "snake_case")]
pub enum CalendarChange {
    CalendarSaved(CalendarId),
    CalendarDeleted(CalendarId),
    SourceSaved(CalendarId),
    SourceDeleted(CalendarId),
}

impl CalendarChange {
    /// The calendar whose merged output is affected.
    pub fn calendar_id(&self) -> CalendarId {
        match *self {
            CalendarChange::CalendarSaved(id)
            | CalendarChange::CalendarDeleted(id)
            | CalendarChange::SourceSaved(id)
            | CalendarChange::SourceDeleted(id) => id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub calendar_id: CalendarId,
    pub ics: String,
    pub edge_cache: EdgeCache,
}

/// Per-calendar outcome of [`MergeEngine::merge_all`].
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub calendar_id: CalendarId,
    pub name: String,
    /// Size in bytes of the merged output, or the error.
    pub result: Result<usize, String>,
}
