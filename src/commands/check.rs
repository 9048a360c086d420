use anyhow::Result;
use calmerge_core::{MergeEngine, Settings};
use owo_colors::OwoColorize;

use crate::utils::tui::create_spinner;

pub async fn run(settings: &Settings, url: &str) -> Result<()> {
    let engine = MergeEngine::from_settings(settings)?;

    let spinner = create_spinner(format!("Checking {}", url.dimmed()));
    let result = engine.processor().check_feed(url).await;
    spinner.finish_and_clear();

    match result {
        Ok(count) => {
            println!("{} {}", "✓".green(), url);
            println!("   {} events", count);
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "✗".red(), url);
            println!("   {}", e.to_string().red());
            anyhow::bail!("Feed check failed")
        }
    }
}
