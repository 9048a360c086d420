#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use calmerge_core::calendar::{MergedCalendar, Source};
use calmerge_core::fetch::RemoteFetcher;
use calmerge_core::store::{InMemoryCalendarRepository, MemoryCacheStore};
use calmerge_core::{Clock, FetchError, ManualClock, MergeEngine, Settings};
use chrono::{DateTime, TimeZone, Utc};

/// Serves fixed bodies per URL; unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct FakeFeeds {
    bodies: Mutex<HashMap<String, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<HashMap<String, usize>>,
    timeouts: Mutex<Vec<(String, Duration)>>,
    total: AtomicUsize,
}

impl FakeFeeds {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    /// Make requests for `url` take `delay` (on the tokio clock).
    pub fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
    }

    /// Timeouts handed to each request, in request order.
    pub fn timeouts(&self) -> Vec<(String, Duration)> {
        self.timeouts.lock().unwrap().clone()
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteFetcher for FakeFeeds {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        self.timeouts.lock().unwrap().push((url.to_string(), timeout));

        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Network(format!("error sending request for url ({url})")))
    }
}

pub struct Harness {
    pub engine: MergeEngine,
    pub feeds: Arc<FakeFeeds>,
    pub clock: ManualClock,
    pub cache: MemoryCacheStore,
    pub calendars: InMemoryCalendarRepository,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 12, 8, 0, 0).unwrap()
}

/// An edit time well outside the cache bypass window.
pub fn long_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

pub fn harness(calendars: Vec<MergedCalendar>) -> Harness {
    let clock = ManualClock::new(start());
    let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let cache = MemoryCacheStore::with_clock(shared_clock.clone());
    let repo = InMemoryCalendarRepository::new(calendars);
    let feeds = FakeFeeds::new();

    let engine = MergeEngine::new(
        &Settings::default(),
        Arc::new(cache.clone()),
        Arc::new(repo.clone()),
        feeds.clone(),
        shared_clock,
    )
    .expect("Should build engine");

    Harness {
        engine,
        feeds,
        clock,
        cache,
        calendars: repo,
    }
}

/// A feed with one VEVENT per `(uid, summary)`.
pub fn feed(events: &[(&str, &str)]) -> String {
    let mut ics = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//Feed//EN\r\n");
    for (uid, summary) in events {
        ics.push_str(&format!(
            "BEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20250501T000000Z\r\n\
DTSTART:20250601T090000Z\r\nDTEND:20250601T093000Z\r\nSUMMARY:{summary}\r\n\
DESCRIPTION:About {summary}\r\nLOCATION:Room 1\r\nEND:VEVENT\r\n"
        ));
    }
    ics.push_str("END:VCALENDAR\r\n");
    ics
}

/// A source last edited long ago.
pub fn source(name: &str, url: &str) -> Source {
    let mut source = Source::new(name, url);
    source.modified_at = long_ago();
    source
}

pub fn local_url(calendar: &MergedCalendar) -> String {
    format!("https://calmerge.org/calendars/{}.ics", calendar.id)
}

/// A calendar with no sources, last edited long ago.
pub fn calendar(name: &str, owner: impl Into<calmerge_core::Entitlements>) -> MergedCalendar {
    let mut calendar = MergedCalendar::new(name, owner);
    calendar.modified_at = long_ago();
    calendar
}
