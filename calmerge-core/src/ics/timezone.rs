//! Time-zone normalization for fetched feeds.
//!
//! Feeds in the wild reference Windows zone names, rely on the non-standard
//! `X-WR-TIMEZONE` calendar property, or omit VTIMEZONE blocks entirely.
//! [`normalize_timezones`] rewrites a document so every zoned date-time uses
//! an IANA TZID and every referenced IANA zone has a VTIMEZONE definition.

use std::collections::HashSet;

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc, Weekday,
};
use chrono_tz::{OffsetComponents, Tz};

use crate::ics::document::{Component, IcsDocument, Property};
use crate::ics::windows_zones::windows_to_iana;

const ICS_DATE_TIME: &str = "%Y%m%dT%H%M%S";
const DATE_TIME_PROPERTIES: &[&str] =
    &["DTSTART", "DTEND", "DUE", "RECURRENCE-ID", "EXDATE", "RDATE"];
const DAY_SECS: i64 = 24 * 60 * 60;

/// Rewrite Windows zone names, apply `X-WR-TIMEZONE` and add missing VTIMEZONEs.
///
/// Generated VTIMEZONE rules are derived from the zone's transitions in
/// `reference_year`.
pub fn normalize_timezones(doc: &mut IcsDocument, reference_year: i32) {
    rename_windows_zones(doc);
    apply_x_wr_timezone(doc);
    add_missing_vtimezones(doc, reference_year);
}

fn rename_windows_zones(doc: &mut IcsDocument) {
    for property in doc.properties.iter_mut().filter(|p| p.name == "X-WR-TIMEZONE") {
        if let Some(iana) = windows_to_iana(&property.value) {
            property.value = iana.to_string();
        }
    }
    for component in &mut doc.components {
        rename_in_component(component);
    }
}

fn rename_in_component(component: &mut Component) {
    let is_timezone = component.is("VTIMEZONE");
    for property in &mut component.properties {
        if let Some(iana) = property.param("TZID").and_then(windows_to_iana) {
            property.set_param("TZID", iana);
        }
        if is_timezone && property.name == "TZID" {
            if let Some(iana) = windows_to_iana(&property.value) {
                property.value = iana.to_string();
            }
        }
    }
    for child in &mut component.components {
        rename_in_component(child);
    }
}

/// Pin floating and UTC event times to the calendar-wide `X-WR-TIMEZONE`.
fn apply_x_wr_timezone(doc: &mut IcsDocument) {
    let Some(tzid) = doc
        .property("X-WR-TIMEZONE")
        .map(|p| p.value.trim().to_string())
    else {
        return;
    };
    let Ok(tz) = tzid.parse::<Tz>() else {
        tracing::debug!(tzid = %tzid, "Ignoring unknown X-WR-TIMEZONE");
        return;
    };

    for event in doc.events_mut() {
        for property in event
            .properties
            .iter_mut()
            .filter(|p| DATE_TIME_PROPERTIES.contains(&p.name.as_str()))
        {
            localize(property, &tzid, tz);
        }
    }
    doc.remove_property("X-WR-TIMEZONE");
}

fn localize(property: &mut Property, tzid: &str, tz: Tz) {
    let is_date = property
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE"));
    if is_date || property.param("TZID").is_some() {
        return;
    }

    let mut local = Vec::new();
    for value in property.value.split(',').map(str::trim) {
        let converted = match value.strip_suffix('Z') {
            Some(utc) => NaiveDateTime::parse_from_str(utc, ICS_DATE_TIME)
                .ok()
                .map(|dt| tz.from_utc_datetime(&dt).naive_local()),
            None => NaiveDateTime::parse_from_str(value, ICS_DATE_TIME).ok(),
        };
        match converted {
            Some(dt) => local.push(dt.format(ICS_DATE_TIME).to_string()),
            // Date-only or malformed values are left alone.
            None => return,
        }
    }

    property.value = local.join(",");
    property.set_param("TZID", tzid);
}

fn add_missing_vtimezones(doc: &mut IcsDocument, reference_year: i32) {
    let defined: HashSet<String> = doc
        .timezones()
        .filter_map(|tz| tz.value("TZID"))
        .map(|tzid| tzid.trim().to_string())
        .collect();

    let mut referenced = Vec::new();
    for component in doc.components.iter().filter(|c| !c.is("VTIMEZONE")) {
        collect_tzids(component, &mut referenced);
    }

    let generated: Vec<Component> = referenced
        .into_iter()
        .filter(|tzid| !defined.contains(tzid))
        .filter_map(|tzid| {
            let vtimezone = vtimezone(&tzid, reference_year);
            if vtimezone.is_none() {
                tracing::debug!(tzid = %tzid, "No VTIMEZONE available for zone");
            }
            vtimezone
        })
        .collect();

    doc.components.splice(0..0, generated);
}

fn collect_tzids(component: &Component, out: &mut Vec<String>) {
    for tzid in component.properties.iter().filter_map(|p| p.param("TZID")) {
        let tzid = tzid.trim();
        if !out.iter().any(|seen| seen == tzid) {
            out.push(tzid.to_string());
        }
    }
    for child in &component.components {
        collect_tzids(child, out);
    }
}

/// One UTC-offset change of a zone.
#[derive(Debug, Clone, PartialEq)]
struct Transition {
    /// Wall-clock time of the change, in the offset that applied before it.
    local_start: NaiveDateTime,
    offset_from: i32,
    offset_to: i32,
    is_dst: bool,
    name: String,
}

/// "nth weekday of month" rule, `nth == -1` meaning the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct YearlyRule {
    month: u32,
    weekday: Weekday,
    nth: i8,
}

impl YearlyRule {
    fn of(date: NaiveDate) -> Self {
        let day = date.day();
        let nth = if day + 7 > days_in_month(date.year(), date.month()) {
            -1
        } else {
            ((day - 1) / 7 + 1) as i8
        };
        YearlyRule {
            month: date.month(),
            weekday: date.weekday(),
            nth,
        }
    }

    fn date_in(self, year: i32) -> Option<NaiveDate> {
        if self.nth < 0 {
            let last = days_in_month(year, self.month);
            let mut date = NaiveDate::from_ymd_opt(year, self.month, last)?;
            while date.weekday() != self.weekday {
                date = date.pred_opt()?;
            }
            Some(date)
        } else {
            let mut date = NaiveDate::from_ymd_opt(year, self.month, 1)?;
            while date.weekday() != self.weekday {
                date = date.succ_opt()?;
            }
            date.checked_add_signed(Duration::weeks(i64::from(self.nth) - 1))
        }
    }

    fn to_rrule(self) -> String {
        format!(
            "FREQ=YEARLY;BYMONTH={};BYDAY={}{}",
            self.month,
            self.nth,
            weekday_code(self.weekday)
        )
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

fn utc_offset(tz: Tz, timestamp: i64) -> Option<i32> {
    let at = DateTime::from_timestamp(timestamp, 0)?.naive_utc();
    Some(tz.offset_from_utc_datetime(&at).fix().local_minus_utc())
}

fn transition_at(tz: Tz, timestamp: i64, offset_from: i32) -> Option<Transition> {
    let at = DateTime::from_timestamp(timestamp, 0)?.naive_utc();
    let offset = tz.offset_from_utc_datetime(&at);
    Some(Transition {
        local_start: DateTime::from_timestamp(timestamp + i64::from(offset_from), 0)?.naive_utc(),
        offset_from,
        offset_to: offset.fix().local_minus_utc(),
        is_dst: offset.dst_offset() != Duration::zero(),
        name: offset.to_string(),
    })
}

/// Offset changes of `tz` during `year`, found by daily sampling and a binary
/// search down to the second.
fn transitions_in_year(tz: Tz, year: i32) -> Option<Vec<Transition>> {
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?.timestamp();
    let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single()?.timestamp();

    let mut transitions = Vec::new();
    let mut t = start;
    let mut current = utc_offset(tz, t)?;
    while t < end {
        let next = (t + DAY_SECS).min(end);
        if utc_offset(tz, next)? != current {
            let (mut lo, mut hi) = (t, next);
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if utc_offset(tz, mid)? == current {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            let transition = transition_at(tz, hi, current)?;
            current = transition.offset_to;
            transitions.push(transition);
        }
        t = next;
    }
    Some(transitions)
}

fn format_offset(secs: i32) -> String {
    let sign = if secs < 0 { '-' } else { '+' };
    let secs = secs.abs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if seconds == 0 {
        format!("{sign}{hours:02}{minutes:02}")
    } else {
        format!("{sign}{hours:02}{minutes:02}{seconds:02}")
    }
}

fn observance(
    is_dst: bool,
    dtstart: NaiveDateTime,
    offset_from: i32,
    offset_to: i32,
    name: &str,
    rrule: Option<String>,
) -> Component {
    let mut component = Component::new(if is_dst { "DAYLIGHT" } else { "STANDARD" });
    component
        .properties
        .push(Property::new("DTSTART", dtstart.format(ICS_DATE_TIME).to_string()));
    component
        .properties
        .push(Property::new("TZOFFSETFROM", format_offset(offset_from)));
    component
        .properties
        .push(Property::new("TZOFFSETTO", format_offset(offset_to)));
    component.properties.push(Property::text("TZNAME", name));
    if let Some(rrule) = rrule {
        component.properties.push(Property::new("RRULE", rrule));
    }
    component
}

/// Build a VTIMEZONE for an IANA zone from the rules in force in `reference_year`.
///
/// Transitions that repeat on the same "nth weekday" the following year are
/// emitted as yearly rules starting in 1970; irregular ones are emitted once.
pub fn vtimezone(tzid: &str, reference_year: i32) -> Option<Component> {
    let tz: Tz = tzid.parse().ok()?;
    let this_year = transitions_in_year(tz, reference_year)?;
    let next_year = transitions_in_year(tz, reference_year + 1)?;

    let mut vtimezone = Component::new("VTIMEZONE");
    vtimezone.properties.push(Property::new("TZID", tzid));

    if this_year.is_empty() {
        let jan_first = Utc.with_ymd_and_hms(reference_year, 1, 1, 0, 0, 0).single()?;
        let offset = tz.offset_from_utc_datetime(&jan_first.naive_utc());
        let secs = offset.fix().local_minus_utc();
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?.and_hms_opt(0, 0, 0)?;
        vtimezone
            .components
            .push(observance(false, epoch, secs, secs, &offset.to_string(), None));
        return Some(vtimezone);
    }

    for transition in &this_year {
        let rule = YearlyRule::of(transition.local_start.date());
        let repeats = next_year.iter().any(|next| {
            next.offset_from == transition.offset_from
                && next.offset_to == transition.offset_to
                && YearlyRule::of(next.local_start.date()) == rule
        });

        let (dtstart, rrule) = match rule.date_in(1970) {
            Some(date) if repeats => (
                date.and_time(transition.local_start.time()),
                Some(rule.to_rrule()),
            ),
            _ => (transition.local_start, None),
        };

        vtimezone.components.push(observance(
            transition.is_dst,
            dtstart,
            transition.offset_from,
            transition.offset_to,
            &transition.name,
            rrule,
        ));
    }

    Some(vtimezone)
}
