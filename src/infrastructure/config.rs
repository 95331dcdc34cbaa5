//! Configuration
//!
//! All configuration is explicit and immutable: the binary assembles an
//! [`AppConfig`] once (defaults, optionally overridden by a JSON file) and
//! passes the pieces into the fetcher, pipeline and repository at
//! construction time. Nothing reads the process environment or mutates
//! configuration after startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub database: DatabaseConfig,
    pub pipeline: PipelineSettings,
}

impl AppConfig {
    /// Load configuration from a JSON file, or fall back to defaults when no
    /// path is given. A named-but-unreadable file is an error, not a silent
    /// fallback.
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading config file {}", path.display()))?;
                let config: AppConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?;
                info!("loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }
}

/// Fetch policy: timeout, retry budget and backoff shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-attempt request timeout in seconds.
    pub timeout_seconds: u64,

    /// Retries after the first attempt; total attempts = max_retries + 1.
    pub max_retries: u32,

    /// First backoff delay in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,

    /// Upper bound on any single backoff delay in milliseconds.
    pub backoff_cap_ms: u64,

    /// Cap on concurrently in-flight requests across the whole run.
    pub max_concurrent_requests: usize,

    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            max_retries: 3,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            max_concurrent_requests: 5,
            user_agent: "arb-crawler/0.3 (assessment appeal research)".to_string(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Delay before the attempt following `attempt`: exponential in the
    /// attempt number, capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let millis = self
            .backoff_base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.backoff_cap_ms);
        Duration::from_millis(millis)
    }
}

/// SQLite connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx database URL, e.g. `sqlite:data/appeals.db`.
    pub url: String,

    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/appeals.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Run-level pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Whether to follow each appeal's detail link and parse the detail page.
    pub fetch_details: bool,

    /// Roll numbers processed concurrently.
    pub max_concurrent_rolls: usize,

    /// Overall run deadline in seconds; unset means no deadline.
    pub run_deadline_seconds: Option<u64>,

    /// Listing URL template; `{roll}` is replaced with the 19 digits.
    pub listing_url_template: String,

    /// When set, the run's aggregates are dumped to this JSON file.
    pub results_path: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            fetch_details: true,
            max_concurrent_rolls: 4,
            run_deadline_seconds: None,
            listing_url_template:
                "https://example.invalid/eservice/Complaints.aspx?RollNo={roll}".to_string(),
            results_path: None,
        }
    }
}
