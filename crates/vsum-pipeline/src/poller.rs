//! Long-poll waiter for remote jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vsum_models::{PollResponse, RemoteJobId, RemoteState};

use crate::error::{PipelineError, PipelineResult};
use crate::metrics::record_remote_wait;
use crate::retry::{retry_async_with, RetryConfig};
use crate::services::RemoteProcessor;

/// Polls a remote job until it reaches a terminal state.
#[derive(Clone)]
pub struct LongPoller {
    remote: Arc<dyn RemoteProcessor>,
    retry: RetryConfig,
    stop: CancellationToken,
}

impl LongPoller {
    pub fn new(remote: Arc<dyn RemoteProcessor>, retry: RetryConfig, stop: CancellationToken) -> Self {
        Self { remote, retry, stop }
    }

    /// Wait for `job_id` to finish and return its result payload.
    ///
    /// Each fetch goes through the poll retry policy. The wait fails with
    /// `RemoteFailed` when the service reports failure, `Timeout` once more
    /// than `timeout` has elapsed without a terminal state, and
    /// `Interrupted` as soon as the stop token fires.
    pub async fn wait_for_result(
        &self,
        job_id: &RemoteJobId,
        timeout: Duration,
        interval: Duration,
    ) -> PipelineResult<serde_json::Value> {
        let started = Instant::now();
        let mut polls = 0u32;

        loop {
            let response = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Err(PipelineError::Interrupted),
                response = self.fetch(job_id) => response?,
            };
            polls += 1;

            match response.state() {
                RemoteState::Succeeded(alias) => {
                    let waited = started.elapsed();
                    info!(
                        job_id = %job_id,
                        alias = alias.as_str(),
                        polls,
                        waited_secs = waited.as_secs(),
                        "Remote job finished"
                    );
                    record_remote_wait(waited.as_secs_f64());
                    return Ok(response.result);
                }
                RemoteState::Failed => {
                    let message = response
                        .error_message
                        .unwrap_or_else(|| "remote job reported failure".to_string());
                    warn!(job_id = %job_id, polls, "Remote job failed: {}", message);
                    return Err(PipelineError::remote_failed(message));
                }
                RemoteState::Running(state) => {
                    debug!(job_id = %job_id, state = %state, polls, "Remote job still running");
                }
            }

            let waited = started.elapsed();
            if waited > timeout {
                return Err(PipelineError::Timeout {
                    job_id: job_id.to_string(),
                    waited,
                });
            }

            tokio::select! {
                biased;
                _ = self.stop.cancelled() => return Err(PipelineError::Interrupted),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    /// One status fetch under the poll retry policy.
    async fn fetch(&self, job_id: &RemoteJobId) -> PipelineResult<PollResponse> {
        let response = retry_async_with(
            &self.retry,
            PipelineError::is_transient,
            PollResponse::is_api_error,
            || self.remote.poll(job_id),
        )
        .await?;

        match response.api_error {
            Some(message) => Err(PipelineError::fatal_fetch(message)),
            None => Ok(response),
        }
    }
}

impl std::fmt::Debug for LongPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongPoller")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
