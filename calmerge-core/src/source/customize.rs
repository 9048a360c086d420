//! Per-source rewriting of events: keyword exclusion, title rules, field
//! removal and branding.
//!
//! Owners without the customization entitlement get their events untouched,
//! which also means no branding suffixes.

use crate::calendar::MergedCalendar;
use crate::config::SiteSettings;
use crate::error::{CalMergeError, CalMergeResult};
use crate::ics::Component;
use crate::source::ProcessedSource;

/// Attribution appended to events when the owner keeps branding on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub product_name: String,
    pub site_url: String,
}

impl Branding {
    pub fn new(product_name: impl Into<String>, site_url: impl Into<String>) -> Self {
        Branding {
            product_name: product_name.into(),
            site_url: site_url.into(),
        }
    }

    pub fn description_suffix(&self) -> String {
        format!("\n\nThis event is powered by {} \n{}", self.product_name, self.site_url)
    }

    pub fn title_suffix(&self) -> String {
        format!(" (via {})", self.product_name)
    }
}

impl From<&SiteSettings> for Branding {
    fn from(site: &SiteSettings) -> Self {
        Branding::new(&site.product_name, &site.base_url)
    }
}

/// Apply `calendar`'s settings for `processed.source` to its document.
///
/// Errors only when there is no document to customize.
pub fn customize(
    processed: &mut ProcessedSource,
    calendar: &MergedCalendar,
    branding: &Branding,
) -> CalMergeResult<()> {
    let ProcessedSource { source, result } = processed;
    let doc = result
        .as_mut()
        .map_err(|_| CalMergeError::CustomizationWithoutCalendar)?;

    if !calendar.owner.can_customize_sources {
        tracing::debug!(
            source = %source.name,
            "Owner cannot customize sources, leaving events untouched"
        );
        return Ok(());
    }

    let settings = &source.settings;
    let keywords = settings.keywords();
    if !keywords.is_empty() {
        let before = doc.events().count();
        doc.retain_events(|event| {
            let title = event.text("SUMMARY").unwrap_or_default().to_lowercase();
            !keywords.iter().any(|kw| title.contains(kw.as_str()))
        });
        let dropped = before - doc.events().count();
        if dropped > 0 {
            tracing::debug!(source = %source.name, dropped, "Excluded events by keyword");
        }
    }

    let show_branding = calendar.show_branding();
    for event in doc.events_mut() {
        rewrite_title(event, settings.include_title, settings.prefix(), &source.name);
        if !settings.include_description {
            event.remove_property("DESCRIPTION");
        }
        if !settings.include_location {
            event.remove_property("LOCATION");
        }
        if show_branding {
            apply_branding(event, branding);
        }
    }

    Ok(())
}

fn rewrite_title(
    event: &mut Component,
    include_title: bool,
    prefix: Option<&str>,
    source_name: &str,
) {
    if !include_title {
        event.set_text("SUMMARY", prefix.unwrap_or(source_name));
        return;
    }

    if let Some(prefix) = prefix {
        let summary = event.text("SUMMARY").unwrap_or_default();
        event.set_text("SUMMARY", &format!("{prefix}: {summary}"));
    }
}

fn apply_branding(event: &mut Component, branding: &Branding) {
    let description = event.text("DESCRIPTION").unwrap_or_default();
    event.set_text(
        "DESCRIPTION",
        &format!("{description}{}", branding.description_suffix()),
    );

    let summary = event.text("SUMMARY").unwrap_or_default();
    event.set_text("SUMMARY", &format!("{summary}{}", branding.title_suffix()));
}
