use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::calendar::{CalendarId, MergedCalendar};
use crate::clock::{Clock, SystemClock};
use crate::config::{MergeSettings, Settings, SiteSettings};
use crate::constants::MERGED_CACHE_PREFIX;
use crate::error::{CalMergeError, CalMergeResult};
use crate::fetch::{DomainConfigs, FetchCache, HttpFetcher, RemoteFetcher};
use crate::merge::assemble::assemble;
use crate::merge::policy::{edge_cache, server_ttl};
use crate::merge::{CalendarChange, MergeOutput, MergeReport};
use crate::source::{
    Allowance, Branding, LocalCalendars, MeetupClient, SourceOrchestrator, SourceProcessor,
};
use crate::store::{CacheStore, CalendarRepository, MemoryCacheStore, TomlCalendarRepository};

/// Produces merged ICS text for calendars, caching results in the shared store.
#[derive(Clone)]
pub struct MergeEngine {
    cache: Arc<dyn CacheStore>,
    calendars: Arc<dyn CalendarRepository>,
    orchestrator: SourceOrchestrator,
    clock: Arc<dyn Clock>,
    merge: MergeSettings,
    site: SiteSettings,
}

impl MergeEngine {
    /// Build an engine around injected collaborators.
    pub fn new(
        settings: &Settings,
        cache: Arc<dyn CacheStore>,
        calendars: Arc<dyn CalendarRepository>,
        remote: Arc<dyn RemoteFetcher>,
        clock: Arc<dyn Clock>,
    ) -> CalMergeResult<Self> {
        let fetch_cache = FetchCache::new(cache.clone(), remote, clock.clone(), &settings.fetch);
        let processor =
            SourceProcessor::new(fetch_cache, clock.clone(), Branding::from(&settings.site));
        let meetup = MeetupClient::new(&settings.meetup)?;

        Ok(MergeEngine {
            cache,
            calendars,
            orchestrator: SourceOrchestrator::new(processor, meetup, settings),
            clock,
            merge: settings.merge.clone(),
            site: settings.site.clone(),
        })
    }

    /// Engine for a single process: in-memory cache, TOML calendar catalog,
    /// real HTTP and the system clock.
    pub fn from_settings(settings: &Settings) -> CalMergeResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let domains = DomainConfigs::from_settings(&settings.domain_configs);
        let remote = HttpFetcher::new(&settings.fetch, Arc::new(domains))?;
        let catalog = TomlCalendarRepository::new(settings.calendars_path()?);
        tracing::info!(catalog = %catalog.path().display(), "Using calendar catalog");

        Self::new(
            settings,
            Arc::new(MemoryCacheStore::with_clock(clock.clone())),
            Arc::new(catalog),
            Arc::new(remote),
            clock,
        )
    }

    pub fn cache_key(id: CalendarId) -> String {
        format!("{MERGED_CACHE_PREFIX}{id}")
    }

    pub fn processor(&self) -> &SourceProcessor {
        self.orchestrator.processor()
    }

    /// Merged ICS text for calendar `id`.
    pub async fn merge(&self, id: CalendarId) -> CalMergeResult<String> {
        Ok(self.merge_with_policy(id).await?.ics)
    }

    /// Merged ICS text plus the caching instruction for HTTP intermediaries.
    pub async fn merge_with_policy(&self, id: CalendarId) -> CalMergeResult<MergeOutput> {
        let calendar = self
            .calendars
            .get(id)
            .await?
            .ok_or(CalMergeError::CalendarNotFound(id))?;

        let ics = self.merge_calendar(&calendar).await?;
        Ok(MergeOutput {
            calendar_id: id,
            ics,
            edge_cache: edge_cache(&calendar, &self.merge, self.clock.now()),
        })
    }

    /// Merge a calendar record directly. Its own identity seeds the reference path.
    pub async fn merge_calendar(&self, calendar: &MergedCalendar) -> CalMergeResult<String> {
        let mut visited = HashSet::from([calendar.id]);
        self.merge_on_path(calendar, &mut visited, None).await
    }

    async fn merge_on_path(
        &self,
        calendar: &MergedCalendar,
        visited: &mut HashSet<CalendarId>,
        allowance: Option<Allowance>,
    ) -> CalMergeResult<String> {
        let key = Self::cache_key(calendar.id);
        if let Some(cached) = self.cache.get(&key).await? {
            tracing::debug!(calendar = %calendar.id, "Merged calendar cache hit");
            return Ok(cached);
        }

        tracing::info!(
            calendar = %calendar.id,
            name = %calendar.name,
            sources = calendar.sources.len(),
            "Merging calendar"
        );
        let results = self
            .orchestrator
            .process_sources(calendar, visited, self, allowance)
            .await;

        let now = self.clock.now();
        let (doc, stats) = assemble(calendar, results, &self.site, now)?;
        let ics = doc.to_ics();

        let ttl = server_ttl(calendar, &self.merge, now);
        self.cache.set(&key, ics.clone(), Some(ttl)).await?;

        tracing::info!(
            calendar = %calendar.id,
            events = stats.events,
            duplicates = stats.duplicates,
            failed_sources = stats.failures,
            ttl_secs = ttl.as_secs(),
            "Merged calendar"
        );
        Ok(ics)
    }

    /// Evict the cached merge of calendar `id`.
    pub async fn invalidate(&self, id: CalendarId) -> CalMergeResult<()> {
        self.cache.delete(&Self::cache_key(id)).await?;
        tracing::info!(calendar = %id, "Invalidated merged calendar cache");
        Ok(())
    }

    /// Eviction hook for edits made on the persistence side.
    pub async fn on_change(&self, change: &CalendarChange) -> CalMergeResult<()> {
        tracing::debug!(change = ?change, "Calendar change received");
        self.invalidate(change.calendar_id()).await
    }

    /// Re-merge every calendar in the repository, one after another.
    pub async fn merge_all(&self) -> CalMergeResult<Vec<MergeReport>> {
        let calendars = self.calendars.all().await?;
        let mut reports = Vec::with_capacity(calendars.len());

        for calendar in &calendars {
            let result = match self.invalidate(calendar.id).await {
                Ok(()) => self.merge_calendar(calendar).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                tracing::error!(calendar = %calendar.id, error = %e, "Failed to merge calendar");
            }
            reports.push(MergeReport {
                calendar_id: calendar.id,
                name: calendar.name.clone(),
                result: result.map(|ics| ics.len()).map_err(|e| e.to_string()),
            });
        }

        let failed = reports.iter().filter(|r| r.result.is_err()).count();
        tracing::info!(calendars = reports.len(), failed, "Merged all calendars");
        Ok(reports)
    }
}

#[async_trait]
impl LocalCalendars for MergeEngine {
    async fn merge_nested(
        &self,
        id: CalendarId,
        visited: &mut HashSet<CalendarId>,
        allowance: Allowance,
    ) -> CalMergeResult<Option<String>> {
        let Some(calendar) = self.calendars.get(id).await? else {
            return Ok(None);
        };
        tracing::info!(
            calendar = %id,
            depth = visited.len(),
            deadline_secs = allowance.deadline.map(|d| d.as_secs()),
            "Resolving local calendar reference"
        );
        self.merge_on_path(&calendar, visited, Some(allowance))
            .await
            .map(Some)
    }
}
