use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};
use url::Url;

use crate::calendar::MergedCalendar;
use crate::config::SiteSettings;
use crate::error::CalMergeResult;
use crate::ics::{self, IcsDocument, Property};
use crate::source::ProcessedSource;

/// Counts from one assembly, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyStats {
    pub events: usize,
    pub duplicates: usize,
    pub failures: usize,
}

/// Build the merged document from per-source results, in source order.
///
/// Events are deduplicated by UID with the first occurrence winning; events
/// without a UID are always kept. VTIMEZONEs are deduplicated by TZID and
/// placed before all events.
pub fn assemble(
    calendar: &MergedCalendar,
    results: Vec<ProcessedSource>,
    site: &SiteSettings,
    now: DateTime<Utc>,
) -> CalMergeResult<(IcsDocument, AssemblyStats)> {
    let mut doc = IcsDocument::new();
    doc.set_property(Property::new("PRODID", product_id(&calendar.name, &site.base_url)));
    doc.set_property(Property::new("VERSION", "2.0"));
    doc.set_property(Property::text("X-WR-CALNAME", &calendar.name));

    let mut stats = AssemblyStats::default();
    let mut seen_uids = HashSet::new();
    let mut seen_tzids = HashSet::new();
    let mut timezones = Vec::new();
    let mut events = Vec::new();
    let mut failures = Vec::new();

    for processed in results {
        let failure = processed.as_failure();
        let Ok(source_doc) = processed.result else {
            failures.extend(failure);
            continue;
        };

        for component in source_doc.components {
            if component.is("VTIMEZONE") {
                let tzid = component.value("TZID").map(|t| t.trim().to_string());
                if let Some(tzid) = tzid {
                    if seen_tzids.insert(tzid) {
                        timezones.push(component);
                    }
                }
            } else if component.is("VEVENT") {
                let duplicate = component
                    .uid()
                    .is_some_and(|uid| !seen_uids.insert(uid.to_string()));
                if duplicate {
                    stats.duplicates += 1;
                } else {
                    events.push(component);
                }
            }
        }
    }

    if !seen_tzids.contains(calendar.timezone.as_str()) {
        if let Some(tz) = ics::vtimezone(&calendar.timezone, now.year()) {
            timezones.push(tz);
        }
    }

    stats.events = events.len();
    stats.failures = failures.len();

    if !failures.is_empty() {
        events.push(ics::source_errors_event(calendar.id, &site.product_name, &failures, now)?);
    }

    if calendar.owner.is_lowest_tier {
        tracing::warn!(
            calendar = %calendar.id,
            name = %calendar.name,
            "Free tier calendar downloaded"
        );
        events.push(ics::free_tier_warning_event(
            calendar.id,
            &site.product_name,
            &site.base_url,
            now,
        )?);
    }

    doc.components = timezones;
    doc.components.extend(events);
    Ok((doc, stats))
}

fn product_id(name: &str, base_url: &str) -> String {
    let host = Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| base_url.to_string());
    format!("-//{name}//{host}//")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::{Source, Tier};
    use chrono::TimeZone;

    fn event_titles(doc: &IcsDocument) -> Vec<String> {
        doc.events().filter_map(|e| e.text("SUMMARY")).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn source_doc(events: &[(&str, &str)], tzid: Option<&str>) -> IcsDocument {
        let mut ics = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:x\r\n");
        if let Some(tzid) = tzid {
            ics.push_str(&format!(
                "BEGIN:VTIMEZONE\r\nTZID:{tzid}\r\nBEGIN:STANDARD\r\nDTSTART:19700101T000000\r\n\
TZOFFSETFROM:+0000\r\nTZOFFSETTO:+0000\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n"
            ));
        }
        for (uid, summary) in events {
            ics.push_str("BEGIN:VEVENT\r\n");
            if !uid.is_empty() {
                ics.push_str(&format!("UID:{uid}\r\n"));
            }
            ics.push_str(&format!("SUMMARY:{summary}\r\nEND:VEVENT\r\n"));
        }
        ics.push_str("END:VCALENDAR\r\n");
        IcsDocument::parse(&ics).unwrap()
    }

    fn ok(name: &str, doc: IcsDocument) -> ProcessedSource {
        ProcessedSource::success(Source::new(name, format!("https://{name}.example/cal.ics")), doc)
    }

    fn business(name: &str) -> MergedCalendar {
        let mut calendar = MergedCalendar::new(name, Tier::Business);
        calendar.timezone = "Europe/London".into();
        calendar
    }

    #[test]
    fn test_first_uid_wins_and_uidless_events_are_kept() {
        let results = vec![
            ok("a", source_doc(&[("shared", "From A"), ("", "No uid")], None)),
            ok("b", source_doc(&[("shared", "From B"), ("b-only", "B"), ("", "No uid")], None)),
        ];

        let (doc, stats) =
            assemble(&business("Team"), results, &SiteSettings::default(), now()).unwrap();

        assert_eq!(event_titles(&doc), vec!["From A", "No uid", "B", "No uid"]);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.events, 4);
    }

    #[test]
    fn test_timezones_are_deduplicated_and_first() {
        let results = vec![
            ok("a", source_doc(&[("1", "One")], Some("Europe/Paris"))),
            ok("b", source_doc(&[("2", "Two")], Some("Europe/Paris"))),
        ];
        let (doc, _) =
            assemble(&business("Team"), results, &SiteSettings::default(), now()).unwrap();

        let tzids: Vec<_> = doc.timezones().filter_map(|tz| tz.value("TZID")).collect();
        assert_eq!(tzids, vec!["Europe/Paris", "Europe/London"]);
        assert!(doc.components[0].is("VTIMEZONE") && doc.components[1].is("VTIMEZONE"));
    }

    #[test]
    fn test_container_properties() {
        let (doc, _) =
            assemble(&business("Team Cal"), vec![], &SiteSettings::default(), now()).unwrap();
        assert_eq!(
            doc.property("PRODID").map(|p| p.value.as_str()),
            Some("-//Team Cal//calmerge.org//")
        );
        assert_eq!(doc.property("VERSION").map(|p| p.value.as_str()), Some("2.0"));
        assert_eq!(
            doc.property("X-WR-CALNAME").map(|p| p.unescaped()).as_deref(),
            Some("Team Cal")
        );
        assert_eq!(doc.events().count(), 0);
    }

    #[test]
    fn test_failures_become_one_error_event() {
        let results = vec![
            ok("a", source_doc(&[("1", "One")], None)),
            ProcessedSource::failure(
                Source::new("Gym", "https://gym.example/cal.ics"),
                "HTTP error: 500",
            ),
            ProcessedSource::failure(
                Source::new("Club", "https://club.example/cal.ics"),
                "Request timed out after 5s",
            ),
        ];
        let (doc, stats) =
            assemble(&business("Team"), results, &SiteSettings::default(), now()).unwrap();
        assert_eq!(stats.failures, 2);

        let errors: Vec<_> = doc
            .events()
            .filter(|e| e.text("SUMMARY").as_deref() == Some("CalMerge: Source Errors"))
            .collect();
        assert_eq!(errors.len(), 1);
        let description = errors[0].text("DESCRIPTION").unwrap();
        assert!(description.contains("Gym (https://gym.example/cal.ics): HTTP error: 500"));
        assert!(description.contains("Club"));
    }

    #[test]
    fn test_free_tier_gets_warning_event() {
        let mut calendar = MergedCalendar::new("Mine", Tier::Free);
        calendar.timezone = "UTC".into();
        let (doc, _) = assemble(&calendar, vec![], &SiteSettings::default(), now()).unwrap();

        let warning = doc.events().next().expect("Warning event");
        assert_eq!(
            warning.uid().map(str::to_string),
            Some(format!("access-warning-{}", calendar.id))
        );
        assert!(warning.components.iter().any(|c| c.is("VALARM")));
    }
}
