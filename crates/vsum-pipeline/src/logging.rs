//! Structured task logging utilities.
//!
//! Provides consistent, structured logging for task processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vsum_models::TaskKey;

/// Install the global tracing subscriber.
///
/// `json` selects JSON lines, otherwise ANSI-colored text. The filter comes
/// from `RUST_LOG` with `vsum=info` added. Returns `false` if a subscriber
/// was already installed.
pub fn init_tracing(json: bool) -> bool {
    let env_filter = EnvFilter::from_default_env().add_directive(
        "vsum=info"
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );

    let result = if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
    };
    result.is_ok()
}

/// Task logger for structured logging with consistent formatting.
///
/// Provides a simple interface for logging stage lifecycle events
/// with automatic contextual information (task key, stage name).
#[derive(Debug, Clone)]
pub struct TaskLogger {
    task_key: String,
    stage: &'static str,
}

impl TaskLogger {
    /// Create a new task logger for a specific task and stage.
    ///
    /// # Arguments
    /// * `key` - The key of the task being driven
    /// * `stage` - The pipeline stage (e.g., "upload", "monitor")
    pub fn new(key: &TaskKey, stage: &'static str) -> Self {
        Self {
            task_key: key.to_string(),
            stage,
        }
    }

    /// Log the start of a stage.
    pub fn log_start(&self, message: &str) {
        info!(
            task_key = %self.task_key,
            stage = self.stage,
            "Stage started: {}", message
        );
    }

    /// Log a progress update while the stage runs.
    pub fn log_progress(&self, message: &str) {
        info!(
            task_key = %self.task_key,
            stage = self.stage,
            "Stage progress: {}", message
        );
    }

    /// Log a warning during the stage.
    pub fn log_warning(&self, message: &str) {
        warn!(
            task_key = %self.task_key,
            stage = self.stage,
            "Stage warning: {}", message
        );
    }

    /// Log a stage failure.
    pub fn log_error(&self, message: &str) {
        error!(
            task_key = %self.task_key,
            stage = self.stage,
            "Stage failed: {}", message
        );
    }

    /// Log the successful end of a stage.
    pub fn log_completion(&self, message: &str) {
        info!(
            task_key = %self.task_key,
            stage = self.stage,
            "Stage completed: {}", message
        );
    }

    /// Get the task key.
    pub fn task_key(&self) -> &str {
        &self.task_key
    }

    /// Get the stage name.
    pub fn stage(&self) -> &'static str {
        self.stage
    }

    /// Create a tracing span for this task and stage.
    ///
    /// Stage futures are instrumented with it so every event they emit
    /// carries the task key.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "task",
            task_key = %self.task_key,
            stage = self.stage
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_logger_creation() {
        let key = TaskKey::parse("BV1xx411c7mD").unwrap();
        let logger = TaskLogger::new(&key, "upload");

        assert_eq!(logger.task_key(), "BV1xx411c7mD");
        assert_eq!(logger.stage(), "upload");
    }

    #[test]
    fn test_init_tracing_only_once() {
        let first = init_tracing(false);
        let second = init_tracing(true);
        assert!(!(first && second));
    }
}
