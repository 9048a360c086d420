use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use url::Url;

use crate::config::FetchSettings;
use crate::error::{CalMergeError, CalMergeResult, FetchError};
use crate::fetch::RemoteFetcher;
use crate::fetch::domain_config::{DomainConfig, DomainConfigProvider, DomainConfigs};

/// reqwest-backed fetcher that sends identifying headers, with per-domain overrides.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    accept: String,
    accept_language: String,
    domains: Arc<dyn DomainConfigProvider>,
}

impl HttpFetcher {
    pub fn new(
        settings: &FetchSettings,
        domains: Arc<dyn DomainConfigProvider>,
    ) -> CalMergeResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CalMergeError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(HttpFetcher {
            client,
            user_agent: settings.user_agent.clone(),
            accept: settings.accept.clone(),
            accept_language: settings.accept_language.clone(),
            domains,
        })
    }

    /// Fetcher with default headers and no domain overrides.
    pub fn with_defaults() -> CalMergeResult<Self> {
        Self::new(&FetchSettings::default(), Arc::new(DomainConfigs::default()))
    }

    fn headers_for(&self, url: &Url) -> HeaderMap {
        let mut user_agent = self.user_agent.as_str();
        let mut accept = self.accept.as_str();

        let config: Option<DomainConfig> = url.host_str().and_then(|host| self.domains.get(host));
        if let Some(config) = &config {
            if let Some(ua) = &config.user_agent {
                user_agent = ua;
            }
            if let Some(a) = &config.accept {
                accept = a;
            }
            tracing::debug!(
                domain = %config.domain,
                custom_user_agent = config.user_agent.is_some(),
                custom_accept = config.accept.is_some(),
                "Applied domain-specific fetch configuration"
            );
        }

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, USER_AGENT, user_agent);
        insert_header(&mut headers, ACCEPT, accept);
        insert_header(&mut headers, ACCEPT_LANGUAGE, &self.accept_language);

        for (name, value) in config.iter().flat_map(|c| c.additional_headers.iter()) {
            match HeaderName::from_bytes(name.as_bytes()) {
                Ok(name) => insert_header(&mut headers, name, value),
                Err(_) => tracing::warn!(header = %name, "Skipping invalid header name"),
            }
        }

        headers
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::warn!(header = %name, "Skipping invalid header value"),
    }
}

/// Parse a feed URL, accepting `webcal://` as an alias for `https://`.
fn parse_feed_url(url: &str) -> Result<Url, FetchError> {
    let trimmed = url.trim();
    let normalized = match trimmed.strip_prefix("webcal://") {
        Some(rest) => format!("https://{rest}"),
        None => trimmed.to_string(),
    };

    let parsed = Url::parse(&normalized).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(FetchError::InvalidUrl(url.to_string())),
    }
}

fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            secs: timeout.as_secs(),
        }
    } else {
        FetchError::from(err)
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let parsed = parse_feed_url(url)?;
        let headers = self.headers_for(&parsed);
        let started = Instant::now();

        let response = self
            .client
            .get(parsed)
            .headers(headers)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?
            .error_for_status()
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| classify(e, timeout))?;
        let text = String::from_utf8_lossy(&body).into_owned();

        tracing::debug!(
            url = %url,
            status = status.as_u16(),
            size_bytes = text.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Fetched remote document"
        );

        Ok(text)
    }
}
