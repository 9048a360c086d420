mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::Router;
use calmerge_core::Settings;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

const DEFAULT_LOG_FILTER: &str = "calmerge_core=info,calmerge_server=info,tower_http=info";

#[derive(Parser)]
#[command(name = "calmerge-server", version, about = "Serve merged calendar feeds over HTTP")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "CALMERGE_BIND", default_value = "127.0.0.1:4096")]
    bind: SocketAddr,

    /// Settings file (defaults to ~/.config/calmerge/config.toml)
    #[arg(long, env = "CALMERGE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load settings")?;

    let state = AppState::new(&settings)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::calendars::router())
        .merge(routes::health::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    tracing::info!(addr = %args.bind, site = %settings.site.base_url, "calmerge-server listening");

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    axum::serve(listener, app).await?;

    Ok(())
}
