use std::sync::Arc;
use std::time::Duration;

use chrono::Datelike;

use crate::calendar::{MergedCalendar, Source};
use crate::clock::Clock;
use crate::constants::CHECK_FEED_TIMEOUT_SECS;
use crate::error::CalMergeResult;
use crate::fetch::FetchCache;
use crate::ics::{self, IcsDocument};
use crate::source::{Branding, ProcessedSource, customize};

/// Fetches, validates, normalizes and customizes a single remote feed.
#[derive(Clone)]
pub struct SourceProcessor {
    fetch_cache: FetchCache,
    clock: Arc<dyn Clock>,
    branding: Branding,
}

impl SourceProcessor {
    pub fn new(fetch_cache: FetchCache, clock: Arc<dyn Clock>, branding: Branding) -> Self {
        SourceProcessor {
            fetch_cache,
            clock,
            branding,
        }
    }

    /// Fetch `url` through the cache and return a parsed document with
    /// time zones normalized.
    pub async fn fetch_and_validate(
        &self,
        url: &str,
        timeout: Duration,
    ) -> CalMergeResult<IcsDocument> {
        let body = self.fetch_cache.fetch(url, Some(timeout)).await?;
        let mut doc = ics::parse_feed(&body)?;
        ics::normalize_timezones(&mut doc, self.clock.now().year());
        Ok(doc)
    }

    /// Process one ordinary feed. Never fails: errors are carried in the result.
    pub async fn process(
        &self,
        calendar: &MergedCalendar,
        source: &Source,
        timeout: Duration,
    ) -> ProcessedSource {
        let mut processed = match self.fetch_and_validate(&source.url, timeout).await {
            Ok(doc) => ProcessedSource::success(source.clone(), doc),
            Err(e) => {
                tracing::warn!(
                    source = %source.name,
                    url = %source.url,
                    error = %e,
                    "Failed to process source"
                );
                ProcessedSource::failure(source.clone(), e)
            }
        };
        self.customize(&mut processed, calendar);
        processed
    }

    /// Customize a processed source in place. Failures are left as they are.
    pub fn customize(&self, processed: &mut ProcessedSource, calendar: &MergedCalendar) {
        if processed.is_ok() {
            if let Err(e) = customize(processed, calendar, &self.branding) {
                tracing::warn!(
                    source = %processed.source.name,
                    error = %e,
                    "Customization skipped"
                );
            }
        }
    }

    /// Check that `url` serves a usable calendar, returning its event count.
    pub async fn check_feed(&self, url: &str) -> CalMergeResult<usize> {
        let doc = self
            .fetch_and_validate(url, Duration::from_secs(CHECK_FEED_TIMEOUT_SECS))
            .await?;
        Ok(doc.events().count())
    }
}
