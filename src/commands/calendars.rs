use anyhow::Result;
use calmerge_core::Settings;
use calmerge_core::store::{CalendarRepository, TomlCalendarRepository};
use owo_colors::OwoColorize;

pub async fn run(settings: &Settings) -> Result<()> {
    let catalog = TomlCalendarRepository::new(settings.calendars_path()?);
    let calendars = catalog.all().await?;

    if calendars.is_empty() {
        println!("No calendars in {}", catalog.path().display().dimmed());
        return Ok(());
    }

    for calendar in &calendars {
        println!("{} {}", calendar.name.bold(), calendar.id.dimmed());
        for source in &calendar.sources {
            println!("   {} {}", source.name, source.url.dimmed());
        }
    }

    Ok(())
}
