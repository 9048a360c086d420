//! iCalendar document handling: parsing, validation, time-zone normalization
//! and serialization.

mod document;
mod generate;
mod timezone;
mod windows_zones;

pub use document::{Component, IcsDocument, Property, escape_text, unescape_text};
pub use generate::{SourceFailure, free_tier_warning_event, from_builder, source_errors_event};
pub use timezone::{normalize_timezones, vtimezone};
pub use windows_zones::windows_to_iana;

use crate::error::{CalMergeError, CalMergeResult};

/// True when a response body is an HTML page rather than calendar data.
pub fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start_matches('\u{feff}')
        .trim_start()
        .chars()
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Parse a fetched feed, rejecting HTML pages and calendars without components.
pub fn parse_feed(body: &str) -> CalMergeResult<IcsDocument> {
    if looks_like_html(body) {
        return Err(CalMergeError::HtmlInsteadOfCalendar);
    }

    let doc = IcsDocument::parse(body)?;
    if doc.is_empty() {
        return Err(CalMergeError::EmptyCalendar);
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_pages_are_detected() {
        assert!(looks_like_html("<!DOCTYPE html><html><body>Login</body></html>"));
        assert!(looks_like_html("\n  <html lang=\"en\">"));
        assert!(looks_like_html("\u{feff}<!doctype HTML>"));
        assert!(!looks_like_html("BEGIN:VCALENDAR\r\nEND:VCALENDAR"));
    }

    #[test]
    fn test_parse_feed_rejects_html_with_legible_error() {
        let err = parse_feed("<!DOCTYPE html><html></html>").unwrap_err();
        assert!(matches!(err, CalMergeError::HtmlInsteadOfCalendar));
        assert!(err.to_string().contains("web page (HTML)"));
    }

    #[test]
    fn test_parse_feed_rejects_empty_calendar() {
        let err = parse_feed("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:x\r\nEND:VCALENDAR\r\n")
            .unwrap_err();
        assert!(matches!(err, CalMergeError::EmptyCalendar));
    }

    #[test]
    fn test_parse_feed_accepts_events() {
        let doc = parse_feed(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:x\r\n\
             BEGIN:VEVENT\r\nUID:a\r\nSUMMARY:Hi\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
        )
        .expect("Should parse");
        assert_eq!(doc.events().count(), 1);
    }
}
