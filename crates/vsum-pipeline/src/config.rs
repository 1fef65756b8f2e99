//! Pipeline configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vsum_models::SubmitOptions;

use crate::retry::RetryConfig;

/// How the two stages are scheduled relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Uploads and monitoring overlap; a submitted task is monitored at once
    #[default]
    Pipelined,
    /// Every upload finishes before any monitoring starts
    Sequential,
}

impl PipelineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineMode::Pipelined => "pipelined",
            PipelineMode::Sequential => "sequential",
        }
    }
}

impl FromStr for PipelineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pipelined" | "pipeline" => Ok(PipelineMode::Pipelined),
            "sequential" => Ok(PipelineMode::Sequential),
            other => Err(format!("unknown pipeline mode: {}", other)),
        }
    }
}

/// Pipeline configuration, built once per batch.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pool size of each stage
    pub max_workers: usize,
    pub mode: PipelineMode,
    /// Sleep between two status polls of one remote job
    pub poll_interval: Duration,
    /// Wall-clock limit for one remote job
    pub poll_timeout: Duration,
    /// Keep the local file after it was published
    pub retain_local: bool,
    /// Validity of the retrieval URL handed to the remote service
    pub url_ttl: Duration,
    /// Object-store key prefix
    pub object_prefix: String,
    /// Retry policy for acquire, publish and submit calls
    pub request_retry: RetryConfig,
    /// Retry policy for a single status poll
    pub poll_retry: RetryConfig,
    /// Status reporter cadence
    pub status_interval: Duration,
    pub submit_options: SubmitOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            mode: PipelineMode::Pipelined,
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(3 * 3600),
            retain_local: false,
            url_ttl: Duration::from_secs(3 * 3600),
            object_prefix: "videos".to_string(),
            request_retry: RetryConfig::new("request"),
            poll_retry: RetryConfig::new("poll"),
            status_interval: Duration::from_secs(2),
            submit_options: SubmitOptions::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let request_retry = RetryConfig::new("request")
            .with_max_retries(env_parse("VSUM_REQUEST_MAX_RETRIES", defaults.request_retry.max_retries))
            .with_base_delay(base_delay_or_default(
                "VSUM_REQUEST_RETRY_BASE_MS",
                std::env::var("VSUM_REQUEST_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.trim().parse().ok()),
                defaults.request_retry.base_delay,
            ));

        let poll_retry = defaults
            .poll_retry
            .clone()
            .with_max_retries(env_parse("VSUM_POLL_MAX_RETRIES", defaults.poll_retry.max_retries));

        Self {
            max_workers: env_parse("VSUM_MAX_WORKERS", defaults.max_workers),
            mode: env_parse("VSUM_MODE", defaults.mode),
            poll_interval: env_secs("VSUM_POLL_INTERVAL_SECS", defaults.poll_interval),
            poll_timeout: env_secs("VSUM_POLL_TIMEOUT_SECS", defaults.poll_timeout),
            retain_local: env_parse("VSUM_RETAIN_LOCAL", defaults.retain_local),
            url_ttl: env_secs("VSUM_URL_TTL_SECS", defaults.url_ttl),
            object_prefix: std::env::var("VSUM_OBJECT_PREFIX").unwrap_or(defaults.object_prefix),
            request_retry,
            poll_retry,
            status_interval: env_secs("VSUM_STATUS_INTERVAL_SECS", defaults.status_interval),
            submit_options: defaults.submit_options,
        }
    }

    /// Effective pool size (at least one worker).
    pub fn workers(&self) -> usize {
        self.max_workers.max(1)
    }
}

fn env_parse<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Backoff base in milliseconds. Must be positive; zero falls back to the
/// default.
fn base_delay_or_default(name: &str, millis: Option<u64>, default: Duration) -> Duration {
    match millis {
        Some(0) => {
            warn!(
                variable = name,
                default_ms = default.as_millis() as u64,
                "Retry base delay must be positive, using default"
            );
            default
        }
        Some(ms) => Duration::from_millis(ms),
        None => default,
    }
}

/// Seconds as a float; out-of-range values fall back to the default.
fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0 && *secs < 1e12)
        .map(Duration::from_secs_f64)
        .unwrap_or(default)
}
