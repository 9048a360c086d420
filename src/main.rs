mod commands;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use calmerge_core::{CalendarId, Settings};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calmerge")]
#[command(about = "Merge remote calendar feeds into one calendar")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "CALMERGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the calendars in the catalog
    Calendars,
    /// Merge one calendar (or every calendar with --all)
    Merge {
        /// Calendar to merge (by id)
        id: Option<String>,

        /// Re-merge every calendar in the catalog
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Write the merged calendar here instead of stdout
        #[arg(short, long, conflicts_with = "all")]
        output: Option<PathBuf>,
    },
    /// Fetch a feed and report how many events it has
    Check { url: String },
    /// Manage encrypted per-domain request overrides
    DomainConfig {
        #[command(subcommand)]
        command: DomainConfigCommands,
    },
}

#[derive(Subcommand)]
enum DomainConfigCommands {
    /// Print a fresh base64 encryption key
    GenerateKey,
    /// Encrypt an override for one host and print the blob
    Encrypt {
        #[arg(long)]
        domain: String,

        #[arg(long)]
        user_agent: Option<String>,

        #[arg(long)]
        accept: Option<String>,

        /// Extra request header, as NAME=VALUE (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,

        #[arg(long)]
        notes: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "calmerge_core=warn".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DomainConfig { command } => match command {
            DomainConfigCommands::GenerateKey => commands::domain_config::generate_key(),
            DomainConfigCommands::Encrypt {
                domain,
                user_agent,
                accept,
                headers,
                notes,
            } => commands::domain_config::encrypt(
                &load_settings(cli.config)?,
                commands::domain_config::EncryptArgs {
                    domain,
                    user_agent,
                    accept,
                    headers,
                    notes,
                },
            ),
        },
        Commands::Calendars => commands::calendars::run(&load_settings(cli.config)?).await,
        Commands::Merge { id, all, output } => {
            let settings = load_settings(cli.config)?;
            if all {
                return commands::merge::run_all(&settings).await;
            }
            let Some(id) = id else {
                anyhow::bail!(
                    "No calendar given.\n\n\
                    Merge one calendar with:\n  \
                    calmerge merge <id>\n\n\
                    Or every calendar with:\n  \
                    calmerge merge --all"
                );
            };
            commands::merge::run(&settings, parse_id(&id)?, output).await
        }
        Commands::Check { url } => commands::check::run(&load_settings(cli.config)?, &url).await,
    }
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Settings::load()?,
    };
    Ok(settings)
}

fn parse_id(id: &str) -> Result<CalendarId> {
    let id = id.strip_suffix(".ics").unwrap_or(id);
    id.parse()
        .map_err(|_| anyhow::anyhow!("'{id}' is not a calendar id (expected a UUID)"))
}
