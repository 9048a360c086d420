//! Synthetic events injected into merged output.
//!
//! Events are built with the icalendar crate's builder and read back into the
//! owned document model, so they serialize the same way as fetched events.

use chrono::{DateTime, Duration, Utc};
use icalendar::{Alarm, Calendar, Component as _, EventLike, Trigger};

use crate::calendar::CalendarId;
use crate::error::{CalMergeError, CalMergeResult};
use crate::ics::document::{Component, IcsDocument};

/// A source that could not be processed during a merge pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub name: String,
    pub url: String,
    pub error: String,
}

/// Convert a built icalendar event into an owned VEVENT.
pub fn from_builder(event: icalendar::Event) -> CalMergeResult<Component> {
    let mut calendar = Calendar::new();
    calendar.push(event);
    let calendar = calendar.done();

    IcsDocument::parse(&calendar.to_string())?
        .components
        .into_iter()
        .find(|c| c.is("VEVENT"))
        .ok_or_else(|| CalMergeError::IcsParse("Generated calendar has no event".into()))
}

/// One event listing every failed source, starting now and lasting an hour.
pub fn source_errors_event(
    calendar_id: CalendarId,
    product_name: &str,
    failures: &[SourceFailure],
    now: DateTime<Utc>,
) -> CalMergeResult<Component> {
    let mut description = String::from("The following sources had errors:\n\n");
    for failure in failures {
        description.push_str(&format!(
            "- {} ({}): {}\n",
            failure.name, failure.url, failure.error
        ));
    }

    let event = icalendar::Event::new()
        .uid(&format!("source-errors-{calendar_id}"))
        .summary(&format!("{product_name}: Source Errors"))
        .description(&description)
        .starts(now)
        .ends(now + Duration::hours(1))
        .done();

    from_builder(event)
}

/// Day-long, high-priority notice for lowest-tier calendars, with a reminder
/// three hours after it starts.
pub fn free_tier_warning_event(
    calendar_id: CalendarId,
    product_name: &str,
    site_url: &str,
    now: DateTime<Utc>,
) -> CalMergeResult<Component> {
    let pricing_url = format!("{}/pricing/", site_url.trim_end_matches('/'));
    let description = format!(
        "⚠️ Your {product_name} calendar access will be discontinued soon.\n\n\
         Subscribe now to keep your calendars synchronized:\n{pricing_url}"
    );
    let reminder = format!(
        "Your {product_name} access will be discontinued. \
         Subscribe to keep your calendars synchronized."
    );

    let event = icalendar::Event::new()
        .uid(&format!("access-warning-{calendar_id}"))
        .summary(&format!(
            "⚠️ Action Required: Your {product_name} Access Will Be Discontinued"
        ))
        .description(&description)
        .starts(now)
        .ends(now + Duration::hours(24))
        .add_property("PRIORITY", "1")
        .alarm(Alarm::display(&reminder, Trigger::after_start(Duration::hours(3))))
        .done();

    from_builder(event)
}
