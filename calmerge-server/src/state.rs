use std::sync::Arc;

use anyhow::{Context, Result};
use calmerge_core::{MergeEngine, Settings};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MergeEngine>,
}

impl AppState {
    pub fn new(settings: &Settings) -> Result<Self> {
        let engine = MergeEngine::from_settings(settings).context("Failed to build merge engine")?;
        Ok(Self::with_engine(engine))
    }

    pub fn with_engine(engine: MergeEngine) -> Self {
        AppState {
            engine: Arc::new(engine),
        }
    }
}
