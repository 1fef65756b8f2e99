//! Pipeline metrics collection.
//!
//! Provides standardized metrics for monitoring a batch:
//! - Task outcome counters by stage
//! - Retry counters by operation
//! - Remote wait and stage latency histograms

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Finished tasks by stage and outcome.
    pub const TASKS_TOTAL: &str = "vsum_tasks_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "vsum_retries_total";

    /// Stage duration in seconds by stage.
    pub const STAGE_SECONDS: &str = "vsum_stage_seconds";

    /// Time spent waiting on remote jobs, in seconds.
    pub const REMOTE_WAIT_SECONDS: &str = "vsum_remote_wait_seconds";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record the outcome of one stage for one task.
pub fn record_stage(stage: &str, outcome: &str, seconds: f64) {
    counter!(
        names::TASKS_TOTAL,
        "stage" => stage.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        names::STAGE_SECONDS,
        "stage" => stage.to_string()
    )
    .record(seconds);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record how long a remote job took from first poll to terminal state.
pub fn record_remote_wait(seconds: f64) {
    histogram!(names::REMOTE_WAIT_SECONDS).record(seconds);
}

// =============================================================================
// Tests
// =============================================================================
