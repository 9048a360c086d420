//! Error types for the calmerge ecosystem.
//!
//! The `Display` text of each variant doubles as the per-source error string
//! shown to subscribers inside the merged calendar, so keep them readable.

use thiserror::Error;

use crate::calendar::CalendarId;

/// Failure to obtain a remote document with no usable cached copy to fall back on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("HTTP error: {status} for url {url}")]
    Status { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return FetchError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        FetchError::Network(err.to_string())
    }
}

/// Errors that can occur in calmerge operations.
#[derive(Error, Debug)]
pub enum CalMergeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Calendar not found: {0}")]
    CalendarNotFound(CalendarId),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("URL did not return valid iCalendar data.\nError Message: \"{0}\"")]
    IcsParse(String),

    #[error("Calendar contains no components")]
    EmptyCalendar,

    #[error(
        "The URL returned a web page (HTML) instead of calendar data. \
         The feed link may be broken, expired or require a login"
    )]
    HtmlInsteadOfCalendar,

    #[error("Invalid local URL format")]
    InvalidLocalUrl,

    #[error("Circular calendar reference detected")]
    CircularReference,

    #[error("Referenced calendar does not exist")]
    ReferencedCalendarMissing,

    #[error("Failed to fetch Meetup calendar: {0}")]
    Meetup(String),

    #[error("Skipped: merge time budget exhausted")]
    BudgetExhausted,

    #[error("Calendar customization attempted without a calendar document")]
    CustomizationWithoutCalendar,

    #[error("Cache store error: {0}")]
    Cache(String),

    #[error("Domain config error: {0}")]
    DomainConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CalMergeError {
    fn from(err: serde_json::Error) -> Self {
        CalMergeError::Serialization(err.to_string())
    }
}

/// Result type alias for calmerge operations.
pub type CalMergeResult<T> = Result<T, CalMergeError>;
