use std::path::PathBuf;

use anyhow::{Context, Result};
use calmerge_core::{CalendarId, MergeEngine, Settings};
use owo_colors::OwoColorize;

use crate::utils::tui::create_spinner;

pub async fn run(settings: &Settings, id: CalendarId, output: Option<PathBuf>) -> Result<()> {
    let engine = MergeEngine::from_settings(settings)?;

    let spinner = create_spinner(format!("Merging {}", id.dimmed()));
    let result = engine.merge(id).await;
    spinner.finish_and_clear();
    let ics = result?;

    match output {
        Some(path) => {
            std::fs::write(&path, &ics)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{} Wrote {}", "✓".green(), path.display());
        }
        None => print!("{ics}"),
    }

    Ok(())
}

pub async fn run_all(settings: &Settings) -> Result<()> {
    let engine = MergeEngine::from_settings(settings)?;

    let spinner = create_spinner("Merging all calendars".to_string());
    let result = engine.merge_all().await;
    spinner.finish_and_clear();
    let reports = result?;

    if reports.is_empty() {
        println!("No calendars to merge.");
        return Ok(());
    }

    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(bytes) => println!(
                "{} {} {}",
                "✓".green(),
                report.name,
                format!("({bytes} bytes)").dimmed()
            ),
            Err(e) => {
                failed += 1;
                println!("{} {}", "✗".red(), report.name);
                println!("   {}", e.red());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} calendars failed to merge", reports.len());
    }
    Ok(())
}
