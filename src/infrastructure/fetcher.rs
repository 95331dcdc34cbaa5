//! Resilient HTTP fetching
//!
//! A [`Fetcher`] wraps a transport with the retry policy: transient failures
//! (connect errors, timeouts, 5xx, 429) are retried with capped exponential
//! backoff, everything else surfaces immediately. The transport itself is a
//! trait so the retry behavior is testable against scripted failures without
//! a network.
//!
//! The fetcher is stateless between calls apart from its connection pool and
//! the semaphore bounding in-flight requests, and is safe to share across
//! many URLs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::infrastructure::config::FetchConfig;

/// Successfully fetched page content.
#[derive(Debug, Clone)]
pub struct RawContent {
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Attempts taken, including the successful one.
    pub attempts: u32,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome of a single transport attempt, before retry classification.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("unreadable response body: {0}")]
    Body(String),
}

impl TransportError {
    /// Connection errors, timeouts, 5xx and 429 are worth retrying; other
    /// client errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) | Self::Body(_) => true,
            Self::Status(status) => *status == 429 || *status >= 500,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }
}

/// Terminal fetch failure, after the retry policy has run its course.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("transient failure after {attempts} attempt(s): {cause}")]
    Transient { attempts: u32, cause: String },

    #[error("permanent failure after {attempts} attempt(s): {cause}")]
    Permanent {
        status: Option<u16>,
        attempts: u32,
        cause: String,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Attempts made before giving up, when the failure was an HTTP outcome.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Transient { attempts, .. } | Self::Permanent { attempts, .. } => Some(*attempts),
            Self::Cancelled => None,
        }
    }
}

/// Raw page transport. One implementation speaks HTTP; tests script their
/// own failure sequences.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .cookie_store(true)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, TransportError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        if body.is_empty() {
            return Err(TransportError::Body(format!("empty response from {url}")));
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// HTTP fetcher with retry, backoff and a global in-flight request cap.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn FetchTransport>,
    config: FetchConfig,
    limiter: Arc<Semaphore>,
}

impl Fetcher {
    /// Build a fetcher speaking real HTTP.
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build a fetcher over a caller-supplied transport.
    pub fn with_transport(config: FetchConfig, transport: Arc<dyn FetchTransport>) -> Self {
        let permits = config.max_concurrent_requests.max(1);
        Self {
            transport,
            config,
            limiter: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Fetch one URL under the configured retry policy.
    pub async fn fetch(&self, url: &str) -> Result<RawContent, FetchError> {
        self.fetch_with_cancel(url, &CancellationToken::new()).await
    }

    /// Fetch one URL; cancellation aborts the in-flight attempt and any
    /// backoff sleep.
    pub async fn fetch_with_cancel(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<RawContent, FetchError> {
        let max_attempts = self.config.max_retries + 1;
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let outcome = {
                let _permit = self
                    .limiter
                    .acquire()
                    .await
                    .map_err(|_| FetchError::Cancelled)?;

                tokio::select! {
                    _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    result = self.transport.get(url) => result,
                }
            };

            match outcome {
                Ok(response) => {
                    debug!(
                        "fetched {} on attempt {}/{} (status {})",
                        url, attempt, max_attempts, response.status
                    );
                    return Ok(RawContent {
                        url: url.to_string(),
                        status: response.status,
                        body: response.body,
                        attempts: attempt,
                        fetched_at: Utc::now(),
                    });
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "attempt {}/{} for {} failed: {}",
                        attempt, max_attempts, url, e
                    );
                    last_error = Some(e);

                    if attempt < max_attempts {
                        let delay = self.config.backoff_delay(attempt);
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                            _ = sleep(delay) => {}
                        }
                    }
                }
                Err(e) => {
                    error!("permanent failure for {} on attempt {}: {}", url, attempt, e);
                    return Err(FetchError::Permanent {
                        status: e.status(),
                        attempts: attempt,
                        cause: e.to_string(),
                    });
                }
            }
        }

        Err(FetchError::Transient {
            attempts: max_attempts,
            cause: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown transport failure".to_string()),
        })
    }

    /// Fetch many URLs, collecting a per-URL outcome. One failed URL never
    /// fails the batch; concurrency is bounded by the shared request cap.
    pub async fn fetch_multiple(
        &self,
        urls: &[String],
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<RawContent, FetchError>)> {
        let tasks = urls.iter().map(|url| {
            let url = url.clone();
            async move {
                let result = self.fetch_with_cancel(&url, cancel).await;
                (url, result)
            }
        });

        futures::future::join_all(tasks).await
    }
}
