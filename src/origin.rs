//! Origin fetching.
//!
//! The cache only depends on [`OriginFetcher`]; [`HttpOriginFetcher`] is the
//! production implementation that GETs `{origin_url}{key}` with an optional
//! retry/timeout policy.

use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of fetch attempts (no retry).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Default backoff between attempts in milliseconds.
pub const DEFAULT_BACKOFF_MS: u64 = 500;

/// Source of payloads for cache misses.
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Retrieve the payload for `key` from origin.
    async fn fetch(&self, key: &str) -> Result<Bytes, FetchError>;
}

/// Retry policy for [`HttpOriginFetcher`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts (minimum 1; 0 is treated as 1).
    pub max_attempts: u32,
    /// Sleep duration between consecutive attempts.
    pub backoff: Duration,
    /// Optional per-request timeout applied to each attempt.
    ///
    /// When `None`, the client's own timeout applies.
    pub timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            timeout: None,
        }
    }
}

/// Fetches keys from an HTTP origin.
#[derive(Clone, Debug)]
pub struct HttpOriginFetcher {
    client: Client,
    origin_url: String,
    retry: RetryConfig,
}

impl HttpOriginFetcher {
    pub fn new(client: Client, origin_url: impl Into<String>, retry: RetryConfig) -> Self {
        let origin_url = origin_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            origin_url,
            retry,
        }
    }

    /// URL the given key is fetched from.
    pub fn url_for(&self, key: &str) -> String {
        if key.starts_with('/') {
            format!("{}{}", self.origin_url, key)
        } else {
            format!("{}/{}", self.origin_url, key)
        }
    }

    async fn attempt(&self, url: &str) -> Result<Bytes, FetchError> {
        let mut request = self.client.get(url);
        if let Some(timeout) = self.retry.timeout {
            request = request.timeout(timeout);
        }

        let request_error = |e: reqwest::Error| FetchError::Request {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.bytes().await.map_err(request_error)
    }
}

#[async_trait]
impl OriginFetcher for HttpOriginFetcher {
    async fn fetch(&self, key: &str) -> Result<Bytes, FetchError> {
        let url = self.url_for(key);
        let max_attempts = self.retry.max_attempts.max(1);
        debug!("Fetching {} from origin", url);

        let mut attempt = 1;
        loop {
            match self.attempt(&url).await {
                Ok(bytes) => return Ok(bytes),
                // Client errors will not change on retry.
                Err(e @ FetchError::Status { status: 400..=499, .. }) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    warn!(
                        "Origin fetch failed for {} (attempt {}/{}): {}",
                        url, attempt, max_attempts, e
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Origin fetch failed for {} (attempt {}/{}): {}",
                        url, attempt, max_attempts, e
                    );
                    warn!("Retrying origin fetch in {}ms...", self.retry.backoff.as_millis());
                    tokio::time::sleep(self.retry.backoff).await;
                    attempt += 1;
                }
            }
        }
    }
}
