//! Owned iCalendar document tree.
//!
//! Parsing goes through the icalendar crate's low-level parser; the borrowed
//! parse tree is copied into owned [`Component`]s so documents from several
//! feeds can be edited and merged freely. Property values are kept in their
//! escaped wire form so unknown properties survive untouched.

use std::fmt::{self, Write as _};

use icalendar::parser::{self, read_calendar, unfold};

use crate::error::{CalMergeError, CalMergeResult};

/// Maximum octets per content line before folding.
const FOLD_OCTETS: usize = 75;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub params: Vec<(String, String)>,
    /// Raw (escaped) value.
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Property {
            name: name.into().to_ascii_uppercase(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// A TEXT property, escaping `value`.
    pub fn text(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, escape_text(value))
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_param(key, value);
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_param(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some((_, v)) => *v = value,
            None => self.params.push((key.to_ascii_uppercase(), value)),
        }
    }

    /// Unescaped TEXT value.
    pub fn unescaped(&self) -> String {
        unescape_text(&self.value)
    }

    fn from_parsed(prop: &parser::Property<'_>) -> Self {
        Property {
            name: prop.name.to_string().to_ascii_uppercase(),
            params: prop
                .params
                .iter()
                .map(|p| {
                    (
                        p.key.to_string().to_ascii_uppercase(),
                        p.val.as_ref().map(|v| v.to_string()).unwrap_or_default(),
                    )
                })
                .collect(),
            value: prop.val.to_string(),
        }
    }

    fn write_line(&self, out: &mut String) {
        let mut line = self.name.clone();
        for (key, value) in &self.params {
            line.push(';');
            line.push_str(key);
            line.push('=');
            if value.contains([':', ';', ',']) {
                let _ = write!(line, "\"{}\"", value.replace('"', ""));
            } else {
                line.push_str(value);
            }
        }
        line.push(':');
        line.push_str(&self.value);
        fold_line(&line, out);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub name: String,
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Component {
            name: name.into().to_ascii_uppercase(),
            properties: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Raw value of the first property called `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.property(name).map(|p| p.value.as_str())
    }

    /// Unescaped TEXT value of the first property called `name`.
    pub fn text(&self, name: &str) -> Option<String> {
        self.property(name).map(Property::unescaped)
    }

    pub fn uid(&self) -> Option<&str> {
        self.value("UID").map(str::trim).filter(|uid| !uid.is_empty())
    }

    /// Replace the first property with the same name, or append.
    pub fn set_property(&mut self, property: Property) {
        match self.property_mut(&property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    /// Set a TEXT property, keeping any existing parameters.
    pub fn set_text(&mut self, name: &str, value: &str) {
        match self.property_mut(name) {
            Some(existing) => existing.value = escape_text(value),
            None => self.properties.push(Property::text(name, value)),
        }
    }

    pub fn remove_property(&mut self, name: &str) {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    fn from_parsed(component: &parser::Component<'_>) -> Self {
        Component {
            name: component.name.to_string().to_ascii_uppercase(),
            properties: component
                .properties
                .iter()
                .map(Property::from_parsed)
                .collect(),
            components: component
                .components
                .iter()
                .map(Component::from_parsed)
                .collect(),
        }
    }

    fn write_to(&self, out: &mut String) {
        fold_line(&format!("BEGIN:{}", self.name), out);
        for property in &self.properties {
            property.write_line(out);
        }
        for child in &self.components {
            child.write_to(out);
        }
        fold_line(&format!("END:{}", self.name), out);
    }
}

/// A VCALENDAR: calendar-level properties and its top-level components.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcsDocument {
    pub properties: Vec<Property>,
    pub components: Vec<Component>,
}

impl IcsDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse ICS text. Several VCALENDAR blocks are flattened into one document.
    pub fn parse(content: &str) -> CalMergeResult<Self> {
        let unfolded = unfold(content);
        let calendar =
            read_calendar(&unfolded).map_err(|e| CalMergeError::IcsParse(e.to_string()))?;

        let mut doc = IcsDocument {
            properties: calendar.properties.iter().map(Property::from_parsed).collect(),
            components: Vec::new(),
        };

        for component in calendar.components.iter().map(Component::from_parsed) {
            if component.is("VCALENDAR") {
                doc.properties.extend(component.properties);
                doc.components.extend(component.components);
            } else {
                doc.components.push(component);
            }
        }

        Ok(doc)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn set_property(&mut self, property: Property) {
        match self
            .properties
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(&property.name))
        {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    pub fn remove_property(&mut self, name: &str) {
        self.properties.retain(|p| !p.name.eq_ignore_ascii_case(name));
    }

    pub fn events(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is("VEVENT"))
    }

    pub fn events_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.components.iter_mut().filter(|c| c.is("VEVENT"))
    }

    pub fn timezones(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is("VTIMEZONE"))
    }

    /// Keep only the events for which `keep` returns true; other components are untouched.
    pub fn retain_events(&mut self, mut keep: impl FnMut(&Component) -> bool) {
        self.components.retain(|c| !c.is("VEVENT") || keep(c));
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn to_ics(&self) -> String {
        let mut out = String::new();
        fold_line("BEGIN:VCALENDAR", &mut out);
        for property in &self.properties {
            property.write_line(&mut out);
        }
        for component in &self.components {
            component.write_to(&mut out);
        }
        fold_line("END:VCALENDAR", &mut out);
        out
    }
}

impl fmt::Display for IcsDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ics())
    }
}

/// Append `line` with CRLF, folding at 75 octets without splitting a UTF-8 character.
fn fold_line(line: &str, out: &mut String) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > FOLD_OCTETS {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out.push_str("\r\n");
}

pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example//EN\r\n\
X-WR-CALNAME:Example\r\n\
BEGIN:VEVENT\r\n\
UID:one@example.com\r\n\
SUMMARY:Standup\r\n\
DTSTART;TZID=America/New_York:20250101T090000\r\n\
DTEND;TZID=America/New_York:20250101T091500\r\n\
BEGIN:VALARM\r\n\
ACTION:DISPLAY\r\n\
TRIGGER:-PT10M\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
SUMMARY:No uid\r\n\
DTSTART:20250102T090000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn test_parse_keeps_nested_components_and_params() {
        let doc = IcsDocument::parse(FEED).expect("Should parse");

        assert_eq!(doc.events().count(), 2);
        assert_eq!(
            doc.property("X-WR-CALNAME").map(|p| p.value.as_str()),
            Some("Example")
        );

        let first = doc.events().next().unwrap();
        assert_eq!(first.uid(), Some("one@example.com"));
        assert_eq!(
            first.property("DTSTART").and_then(|p| p.param("TZID")),
            Some("America/New_York")
        );
        assert_eq!(first.components.len(), 1);
        assert!(first.components[0].is("VALARM"));

        assert_eq!(doc.events().nth(1).unwrap().uid(), None);
    }

    #[test]
    fn test_serialized_document_parses_back() {
        let doc = IcsDocument::parse(FEED).expect("Should parse");
        let text = doc.to_ics();

        assert!(text.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(text.ends_with("END:VCALENDAR\r\n"));
        assert_eq!(IcsDocument::parse(&text).expect("Should reparse"), doc);
    }

    #[test]
    fn test_long_lines_are_folded_on_char_boundaries() {
        let mut event = Component::new("VEVENT");
        event.set_text("DESCRIPTION", &"é".repeat(100));
        let mut doc = IcsDocument::new();
        doc.components.push(event);

        let text = doc.to_ics();
        for line in text.split("\r\n") {
            assert!(line.len() <= 75, "Line too long: {} octets", line.len());
        }

        let reparsed = IcsDocument::parse(&text).expect("Should reparse");
        let desc = reparsed.events().next().unwrap().text("DESCRIPTION").unwrap();
        assert_eq!(desc, "é".repeat(100));
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(escape_text("a, b; c\\d\ne"), "a\\, b\\; c\\\\d\\ne");
        assert_eq!(unescape_text("a\\, b\\; c\\\\d\\ne"), "a, b; c\\d\ne");
    }

    #[test]
    fn test_retain_events_leaves_timezones() {
        let mut doc = IcsDocument::new();
        doc.components.push(Component::new("VTIMEZONE"));
        doc.components.push(Component::new("VEVENT"));
        doc.retain_events(|_| false);
        assert_eq!(doc.components.len(), 1);
        assert_eq!(doc.timezones().count(), 1);
    }

    #[test]
    fn test_output_is_verbatim_and_stable() {
        let feed = "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:x\r\n\
BEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\n\
BEGIN:STANDARD\r\nDTSTART:19701025T030000\r\nTZOFFSETFROM:+0200\r\n\
TZOFFSETTO:+0100\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n\
BEGIN:VEVENT\r\nUID:1\r\nSUMMARY:Lunch\r\nCATEGORIES:Food\r\nCATEGORIES:Social\r\n\
DTSTART;TZID=Europe/Berlin:20250101T120000\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let doc = IcsDocument::parse(feed).expect("Should parse");

        let text = doc.to_ics();
        assert_eq!(text, feed, "Properties keep their order and nothing is added");
        assert_eq!(doc.to_ics(), text);
        assert_eq!(text.matches("UID:").count(), 1);
        assert!(!text.contains("DTSTAMP"));
    }
}
