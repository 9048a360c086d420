//! Meetup group events via the public events API, used when a group's ICS
//! export cannot be fetched.

use std::time::Duration;

use chrono::{DateTime, Utc};
use icalendar::{Component as _, EventLike};
use serde::Deserialize;
use url::Url;

use crate::config::MeetupSettings;
use crate::error::{CalMergeError, CalMergeResult};
use crate::ics::{Component, IcsDocument, Property, from_builder};

const DEFAULT_EVENT_MILLIS: i64 = 3 * 60 * 60 * 1000;
const ICS_UTC: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, Deserialize)]
struct MeetupEvent {
    id: String,
    name: String,
    time: i64,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    updated: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    how_to_find_us: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    venue: Option<MeetupVenue>,
    #[serde(default)]
    group: Option<MeetupGroup>,
    #[serde(default)]
    rsvp_limit: Option<u32>,
    #[serde(default)]
    yes_rsvp_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct MeetupVenue {
    name: Option<String>,
    address_1: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MeetupGroup {
    id: Option<serde_json::Value>,
    name: Option<String>,
    who: Option<String>,
}

/// Group URL name: the first path segment of a meetup.com URL.
pub fn meetup_group_name(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    parsed
        .path_segments()?
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct MeetupClient {
    client: reqwest::Client,
    api_base_url: String,
    timeout: Duration,
}

impl MeetupClient {
    pub fn new(settings: &MeetupSettings) -> CalMergeResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CalMergeError::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(MeetupClient {
            client,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }

    /// Fetch the upcoming events of the group behind `meetup_url` as a calendar.
    pub async fn fetch_calendar(&self, meetup_url: &str) -> CalMergeResult<IcsDocument> {
        let group = meetup_group_name(meetup_url)
            .ok_or_else(|| CalMergeError::Meetup(format!("no group name in '{meetup_url}'")))?;
        let api_url = format!("{}/{group}/events", self.api_base_url);

        let events: Vec<MeetupEvent> = self
            .client
            .get(&api_url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CalMergeError::Meetup(e.to_string()))?
            .json()
            .await
            .map_err(|e| CalMergeError::Meetup(e.to_string()))?;

        tracing::info!(group = %group, count = events.len(), "Fetched Meetup events from API");

        let mut doc = IcsDocument::new();
        doc.set_property(Property::new("PRODID", "-//CalMerge//Meetup Calendar//EN"));
        doc.set_property(Property::new("VERSION", "2.0"));
        doc.set_property(Property::text("X-WR-CALNAME", "Meetup Events"));
        for event in &events {
            match to_component(event) {
                Ok(component) => doc.components.push(component),
                Err(e) => tracing::warn!(event_id = %event.id, error = %e, "Skipping Meetup event"),
            }
        }
        Ok(doc)
    }
}

fn from_millis(millis: i64) -> CalMergeResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| CalMergeError::Meetup(format!("timestamp out of range: {millis}")))
}

fn to_component(event: &MeetupEvent) -> CalMergeResult<Component> {
    let start = from_millis(event.time)?;
    let duration = event.duration.unwrap_or(DEFAULT_EVENT_MILLIS);
    let end = event
        .time
        .checked_add(duration)
        .ok_or_else(|| CalMergeError::Meetup(format!("duration out of range: {duration}")))
        .and_then(from_millis)?;

    let mut description = event
        .description
        .as_deref()
        .map(html_to_text)
        .unwrap_or_default();
    if let Some(directions) = event.how_to_find_us.as_deref().filter(|d| !d.trim().is_empty()) {
        description.push_str(&format!("\n\nHow to find us: {}", directions.trim()));
    }

    let mut builder = icalendar::Event::new();
    builder
        .uid(&format!("meetup-{}@calmerge", event.id))
        .summary(&event.name)
        .starts(start)
        .ends(end);
    if !description.is_empty() {
        builder.description(&description);
    }
    let mut component = from_builder(builder.done())?;

    if let Some(updated) = event.updated {
        let stamp = from_millis(updated)?;
        component.set_property(Property::new("DTSTAMP", stamp.format(ICS_UTC).to_string()));
    }
    if let Some(link) = &event.link {
        component.set_property(Property::new("URL", link.clone()));
    }

    if let Some(venue) = &event.venue {
        let location = [&venue.name, &venue.address_1, &venue.city, &venue.state, &venue.country]
            .into_iter()
            .flatten()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
        if !location.is_empty() {
            component.set_text("LOCATION", &location);
        }
        if let (Some(lat), Some(lon)) = (venue.lat, venue.lon) {
            component.set_property(Property::new("GEO", format!("{lat};{lon}")));
        }
    }

    let status = if event.status.as_deref() == Some("upcoming") {
        "CONFIRMED"
    } else {
        "CANCELLED"
    };
    component.set_property(Property::new("STATUS", status));

    if let Some(group) = &event.group {
        if let Some(name) = &group.name {
            component.set_property(
                Property::new("ORGANIZER", "mailto:noreply@meetup.com")
                    .with_param("CN", name.as_str()),
            );
        }
        if let Some(who) = group.who.as_deref().filter(|w| !w.is_empty()) {
            component.set_property(Property::text("CATEGORIES", who));
        }
        if let Some(id) = &group.id {
            let id = id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string());
            component.set_property(Property::new("X-MEETUP-GROUP-ID", id));
        }
    }

    component.set_property(Property::new("X-MEETUP-EVENT-ID", event.id.clone()));
    if let Some(limit) = event.rsvp_limit {
        component.set_property(Property::new("X-MEETUP-RSVP-LIMIT", limit.to_string()));
    }
    if let Some(count) = event.yes_rsvp_count {
        component.set_property(Property::new("X-MEETUP-YES-RSVP-COUNT", count.to_string()));
    }

    Ok(component)
}

/// Render Meetup's HTML descriptions as plain text.
fn html_to_text(html: &str) -> String {
    let rendered = html2text::from_read(html.as_bytes(), 10_000).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "HTML conversion failed, using raw description");
        html.to_string()
    });

    let mut out = String::with_capacity(rendered.len());
    let mut blank_run = 0;
    for line in rendered.replace("**", "").lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: &str = r#"[
        {
            "id": "301234567",
            "name": "Rust Hack Night",
            "time": 1751486400000,
            "duration": 7200000,
            "updated": 1750000000000,
            "description": "<p>Bring a <b>laptop</b>.</p><p>Pizza provided.</p>",
            "how_to_find_us": "Ring the bell",
            "link": "https://www.meetup.com/rust-nyc/events/301234567/",
            "status": "upcoming",
            "venue": {"name": "Hacker Loft", "address_1": "1 Main St", "city": "New York",
                      "state": "NY", "country": "us", "lat": 40.7, "lon": -74.0},
            "group": {"id": 12345, "name": "Rust NYC", "who": "Rustaceans"},
            "rsvp_limit": 40,
            "yes_rsvp_count": 12
        },
        {
            "id": "301234568",
            "name": "Cancelled Talk",
            "time": 1752091200000,
            "status": "cancelled"
        }
    ]"#;

    fn client(server: &mockito::Server) -> MeetupClient {
        MeetupClient::new(&MeetupSettings {
            api_base_url: server.url(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_group_name_is_first_path_segment() {
        assert_eq!(
            meetup_group_name("https://www.meetup.com/rust-nyc/events/ical/").as_deref(),
            Some("rust-nyc")
        );
        assert_eq!(meetup_group_name("https://www.meetup.com/"), None);
    }

    #[tokio::test]
    async fn test_api_events_become_calendar() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/rust-nyc/events")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(EVENTS)
            .create_async()
            .await;

        let doc = client(&server)
            .fetch_calendar("https://www.meetup.com/rust-nyc/events/ical/")
            .await
            .expect("Should convert");
        mock.assert_async().await;

        assert_eq!(
            doc.property("X-WR-CALNAME").map(|p| p.unescaped()).as_deref(),
            Some("Meetup Events")
        );
        let events: Vec<_> = doc.events().collect();
        assert_eq!(events.len(), 2);

        let first = events[0];
        assert_eq!(first.uid(), Some("meetup-301234567@calmerge"));
        assert_eq!(first.value("DTSTART"), Some("20250702T200000Z"));
        assert_eq!(first.value("DTEND"), Some("20250702T220000Z"));
        assert_eq!(first.value("STATUS"), Some("CONFIRMED"));
        assert_eq!(first.value("GEO"), Some("40.7;-74"));
        assert_eq!(
            first.text("LOCATION").as_deref(),
            Some("Hacker Loft, 1 Main St, New York, NY, us")
        );
        assert_eq!(first.property("ORGANIZER").unwrap().param("CN"), Some("Rust NYC"));
        assert_eq!(first.value("X-MEETUP-GROUP-ID"), Some("12345"));
        assert_eq!(first.value("X-MEETUP-YES-RSVP-COUNT"), Some("12"));

        let description = first.text("DESCRIPTION").unwrap();
        assert!(description.contains("laptop"), "{description}");
        assert!(!description.contains("<p>"));
        assert!(description.ends_with("How to find us: Ring the bell"));

        let second = events[1];
        assert_eq!(second.value("STATUS"), Some("CANCELLED"));
        assert_eq!(second.value("DTEND"), Some("20250709T230000Z"), "Defaults to three hours");
    }

    #[tokio::test]
    async fn test_api_failure_is_meetup_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rust-nyc/events")
            .with_status(503)
            .create_async()
            .await;

        let err = client(&server)
            .fetch_calendar("https://www.meetup.com/rust-nyc/")
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to fetch Meetup calendar"));
    }

    #[tokio::test]
    async fn test_event_ending_out_of_range_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rust-nyc/events")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"id": "1", "name": "Forever", "time": 1751486400000,
                     "duration": 9223372036854775000},
                    {"id": "2", "name": "Social", "time": 1751486400000}
                ]"#,
            )
            .create_async()
            .await;

        let doc = client(&server)
            .fetch_calendar("https://www.meetup.com/rust-nyc/")
            .await
            .expect("One bad event does not fail the calendar");

        let names: Vec<_> = doc.events().filter_map(|e| e.text("SUMMARY")).collect();
        assert_eq!(names, vec!["Social"]);
    }

    #[test]
    fn test_end_overflow_is_meetup_error() {
        let event: MeetupEvent = serde_json::from_str(
            r#"{"id": "1", "name": "Forever", "time": 1751486400000,
                "duration": 9223372036854775000}"#,
        )
        .unwrap();
        let err = to_component(&event).unwrap_err();
        assert!(matches!(err, CalMergeError::Meetup(msg) if msg.contains("out of range")));
    }
}
