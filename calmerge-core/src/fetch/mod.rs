//! Remote feed fetching behind a stale-while-revalidate cache.

mod cache;
pub mod domain_config;
mod http;

pub use cache::FetchCache;
pub use domain_config::{DomainConfig, DomainConfigProvider, DomainConfigs};
pub use http::HttpFetcher;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;

/// Retrieves the body of a remote document.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
}
