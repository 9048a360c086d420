//! Classification of a source URL, resolved once before processing.

use url::Url;

use crate::calendar::CalendarId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Another merged calendar hosted here. `None` when the URL carries no valid id.
    Local(Option<CalendarId>),
    /// A meetup.com group, with the event API as fallback.
    Meetup,
    /// Any other remote ICS feed.
    Feed,
}

impl SourceKind {
    pub fn resolve(url: &str, site_base_url: &str) -> Self {
        if is_local_url(url, site_base_url) {
            SourceKind::Local(parse_calendar_uuid(url))
        } else if is_meetup_url(url) {
            SourceKind::Meetup
        } else {
            SourceKind::Feed
        }
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// True when `url` points at this site.
pub fn is_local_url(url: &str, site_base_url: &str) -> bool {
    match (host_of(url), host_of(site_base_url)) {
        (Some(host), Some(site)) => host == site,
        _ => false,
    }
}

pub fn is_meetup_url(url: &str) -> bool {
    host_of(url).is_some_and(|host| host == "meetup.com" || host.ends_with(".meetup.com"))
}

/// Calendar id from `.../calendars/{uuid}.ics` (or `.ical`, or no extension).
pub fn parse_calendar_uuid(url: &str) -> Option<CalendarId> {
    let parsed = Url::parse(url.trim()).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let id = segment
        .strip_suffix(".ics")
        .or_else(|| segment.strip_suffix(".ical"))
        .unwrap_or(segment);
    id.parse().ok()
}
