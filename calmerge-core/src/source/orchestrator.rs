use std::collections::HashSet;

use async_trait::async_trait;
use tokio::time::{Duration, Instant};

use crate::calendar::{CalendarId, MergedCalendar, Source};
use crate::config::{BudgetSettings, Settings};
use crate::error::{CalMergeError, CalMergeResult};
use crate::ics::IcsDocument;
use crate::source::{
    Allowance, MeetupClient, ProcessedSource, SourceKind, SourceProcessor, TimeoutBudget,
};

/// Merged output of other calendars hosted here, for sources that reference them.
#[async_trait]
pub trait LocalCalendars: Send + Sync {
    /// Merged ICS text of calendar `id`, or `None` if it does not exist.
    ///
    /// `visited` holds every calendar on the current reference path, and the
    /// nested pass must stay within `allowance`.
    async fn merge_nested(
        &self,
        id: CalendarId,
        visited: &mut HashSet<CalendarId>,
        allowance: Allowance,
    ) -> CalMergeResult<Option<String>>;
}

/// Runs every source of a calendar in order, dispatching on [`SourceKind`].
#[derive(Clone)]
pub struct SourceOrchestrator {
    processor: SourceProcessor,
    meetup: MeetupClient,
    budget: BudgetSettings,
    site_base_url: String,
}

impl SourceOrchestrator {
    pub fn new(processor: SourceProcessor, meetup: MeetupClient, settings: &Settings) -> Self {
        SourceOrchestrator {
            processor,
            meetup,
            budget: settings.budget.clone(),
            site_base_url: settings.site.base_url.clone(),
        }
    }

    pub fn processor(&self) -> &SourceProcessor {
        &self.processor
    }

    /// Process all sources of `calendar`, one result per source in source order.
    ///
    /// A top-level pass gets the full configured budget; a nested pass
    /// (`allowance` set) is held to what its referencing source had left.
    pub async fn process_sources(
        &self,
        calendar: &MergedCalendar,
        visited: &mut HashSet<CalendarId>,
        local: &dyn LocalCalendars,
        allowance: Option<Allowance>,
    ) -> Vec<ProcessedSource> {
        let count = calendar.sources.len();
        let mut budget = match allowance {
            Some(allowance) => TimeoutBudget::within(&self.budget, allowance, count),
            None => TimeoutBudget::new(&self.budget, count),
        };
        let mut results = Vec::with_capacity(calendar.sources.len());

        for source in &calendar.sources {
            let Some(timeout) = budget.next_timeout() else {
                tracing::warn!(
                    calendar = %calendar.id,
                    source = %source.name,
                    spent_secs = budget.spent().as_secs(),
                    "Merge budget exhausted, skipping source"
                );
                budget.skip();
                results.push(ProcessedSource::failure(
                    source.clone(),
                    CalMergeError::BudgetExhausted,
                ));
                continue;
            };

            let started = Instant::now();
            let processed = match SourceKind::resolve(&source.url, &self.site_base_url) {
                SourceKind::Local(id) => {
                    let allowance = budget.allowance(timeout);
                    self.process_local(calendar, source, id, visited, local, allowance)
                        .await
                }
                SourceKind::Meetup => self.process_meetup(calendar, source, timeout).await,
                SourceKind::Feed => self.processor.process(calendar, source, timeout).await,
            };
            budget.record(started.elapsed());

            tracing::debug!(
                calendar = %calendar.id,
                source = %source.name,
                ok = processed.is_ok(),
                timeout_secs = timeout.as_secs(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Processed source"
            );
            results.push(processed);
        }

        results
    }

    async fn process_local(
        &self,
        calendar: &MergedCalendar,
        source: &Source,
        id: Option<CalendarId>,
        visited: &mut HashSet<CalendarId>,
        local: &dyn LocalCalendars,
        allowance: Allowance,
    ) -> ProcessedSource {
        let Some(id) = id else {
            return self.failed(source, CalMergeError::InvalidLocalUrl);
        };
        if visited.contains(&id) {
            return self.failed(source, CalMergeError::CircularReference);
        }

        visited.insert(id);
        let nested = local.merge_nested(id, visited, allowance).await;
        visited.remove(&id);

        let mut processed = match nested.and_then(|ics| match ics {
            Some(ics) => IcsDocument::parse(&ics),
            None => Err(CalMergeError::ReferencedCalendarMissing),
        }) {
            Ok(doc) => ProcessedSource::success(source.clone(), doc),
            Err(e) => return self.failed(source, e),
        };
        self.processor.customize(&mut processed, calendar);
        processed
    }

    /// Meetup groups: the ICS export first, the events API if that fails.
    async fn process_meetup(
        &self,
        calendar: &MergedCalendar,
        source: &Source,
        timeout: Duration,
    ) -> ProcessedSource {
        let doc = match self.processor.fetch_and_validate(&source.url, timeout).await {
            Ok(doc) => Ok(doc),
            Err(e) => {
                tracing::info!(
                    source = %source.name,
                    error = %e,
                    "Meetup ICS export unavailable, falling back to the events API"
                );
                self.meetup.fetch_calendar(&source.url).await
            }
        };

        let mut processed = match doc {
            Ok(doc) => ProcessedSource::success(source.clone(), doc),
            Err(e) => return self.failed(source, e),
        };
        self.processor.customize(&mut processed, calendar);
        processed
    }

    fn failed(&self, source: &Source, error: CalMergeError) -> ProcessedSource {
        tracing::warn!(
            source = %source.name,
            url = %source.url,
            error = %error,
            "Failed to process source"
        );
        ProcessedSource::failure(source.clone(), error)
    }
}
