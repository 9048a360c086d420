//! Turning configured sources into customized calendar documents.
//!
//! A source either yields a document or an error string; failures never
//! escape this module, they are carried into the merged output instead.

mod budget;
mod customize;
mod kind;
mod meetup;
mod orchestrator;
mod processor;

pub use budget::{Allowance, TimeoutBudget};
pub use customize::{Branding, customize};
pub use kind::{SourceKind, is_local_url, is_meetup_url, parse_calendar_uuid};
pub use meetup::{MeetupClient, meetup_group_name};
pub use orchestrator::{LocalCalendars, SourceOrchestrator};
pub use processor::SourceProcessor;

use std::fmt;

use crate::calendar::Source;
use crate::ics::{IcsDocument, SourceFailure};

/// Outcome of processing one source.
#[derive(Debug, Clone)]
pub struct ProcessedSource {
    pub source: Source,
    pub result: Result<IcsDocument, String>,
}

impl ProcessedSource {
    pub fn success(source: Source, document: IcsDocument) -> Self {
        ProcessedSource {
            source,
            result: Ok(document),
        }
    }

    pub fn failure(source: Source, error: impl fmt::Display) -> Self {
        ProcessedSource {
            source,
            result: Err(error.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn document(&self) -> Option<&IcsDocument> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().err().map(String::as_str)
    }

    /// The failure as listed in the merged calendar's error event.
    pub fn as_failure(&self) -> Option<SourceFailure> {
        self.error().map(|error| SourceFailure {
            name: self.source.name.clone(),
            url: self.source.url.clone(),
            error: error.to_string(),
        })
    }
}
