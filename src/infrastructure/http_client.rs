//! HTTP image fetcher
//!
//! Thin reqwest wrapper that turns a remote image reference into bytes or a
//! typed [`EnrichmentError`]. No retries here: a failed image is a terminal,
//! local outcome for the run.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, header::CONTENT_TYPE};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::domain::services::ImageFetcher;
use crate::infrastructure::config::HttpConfig;
use crate::infrastructure::harvest_error::EnrichmentError;

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
    /// Whether to follow redirects
    pub follow_redirects: bool,
    /// Bodies larger than this are rejected
    pub max_image_bytes: usize,
}

impl HttpClientConfig {
    /// Create HttpClientConfig from the application's HTTP section
    pub fn from_http_config(config: &HttpConfig) -> Self {
        Self {
            timeout_seconds: config.timeout_seconds,
            user_agent: config.user_agent.clone(),
            follow_redirects: config.follow_redirects,
            max_image_bytes: config.max_image_bytes,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from_http_config(&HttpConfig::default())
    }
}

/// Image fetcher backed by a shared reqwest client
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    config: HttpClientConfig,
}

impl HttpImageFetcher {
    /// Create a new fetcher with custom configuration
    pub fn with_config(config: HttpClientConfig) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .gzip(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client, config })
    }

    pub fn from_http_config(config: &HttpConfig) -> anyhow::Result<Self> {
        Self::with_config(HttpClientConfig::from_http_config(config))
    }
}

/// Only absolute http(s) references can be fetched
pub fn validate_image_url(url: &str) -> Result<Url, EnrichmentError> {
    let parsed = Url::parse(url.trim()).map_err(|e| EnrichmentError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(EnrichmentError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

/// Missing content types are tolerated, some CDNs omit them
fn is_acceptable_content_type(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|ct| {
        let ct = ct.trim().to_ascii_lowercase();
        ct.starts_with("image/") || ct.starts_with("application/octet-stream")
    })
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EnrichmentError> {
        let parsed = validate_image_url(url)?;

        debug!("🌐 HTTP GET (image): {}", parsed);
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| EnrichmentError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnrichmentError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !is_acceptable_content_type(content_type.as_deref()) {
            return Err(EnrichmentError::decode(
                url,
                format!("unexpected content type {}", content_type.unwrap_or_default()),
            ));
        }

        let limit = self.config.max_image_bytes;
        if response.content_length().is_some_and(|len| len as usize > limit) {
            return Err(EnrichmentError::fetch(url, format!("body exceeds {limit} bytes")));
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| EnrichmentError::fetch(url, e))?;
            if body.len() + chunk.len() > limit {
                return Err(EnrichmentError::fetch(url, format!("body exceeds {limit} bytes")));
            }
            body.extend_from_slice(&chunk);
        }

        if body.is_empty() {
            return Err(EnrichmentError::decode(url, "empty body"));
        }

        debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
