//! Read-only views of batch progress, for status consumers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::{RemoteJobId, TaskKey, TaskStatus};

/// Point-in-time copy of one task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub key: TaskKey,
    /// 1-based position in the batch
    pub index: usize,
    /// Batch size (display only)
    pub total: usize,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Time since creation, or total time once terminal
    pub elapsed: Duration,
    /// Time since the remote job was submitted, while it is running
    pub processing_elapsed: Option<Duration>,
    pub remote_job_id: Option<RemoteJobId>,
    /// Result handling is running
    pub post_processing: bool,
    pub error: Option<String>,
}

impl fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}] {} | status: {}",
            self.index, self.total, self.key, self.status
        )?;

        match (self.status, self.processing_elapsed) {
            (TaskStatus::Processing, Some(processing)) => {
                write!(f, " | processing: {}s", processing.as_secs())?;
                if self.post_processing {
                    f.write_str(" | writing results")?;
                }
            }
            (status, _) if status.is_terminal() => {
                write!(f, " | total: {}s", self.elapsed.as_secs())?;
                if let Some(error) = &self.error {
                    write!(f, " | error: {}", error)?;
                }
            }
            _ => write!(f, " | elapsed: {}s", self.elapsed.as_secs())?,
        }

        Ok(())
    }
}

/// Number of records in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StatusCounts {
    pub pending: usize,
    pub downloading: usize,
    pub uploading: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl StatusCounts {
    /// Count a sequence of statuses.
    pub fn tally<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = TaskStatus>,
    {
        let mut counts = Self::default();
        for status in statuses {
            *counts.slot_mut(status) += 1;
            counts.total += 1;
        }
        counts
    }

    /// Count for one status.
    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Downloading => self.downloading,
            TaskStatus::Uploading => self.uploading,
            TaskStatus::Processing => self.processing,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
        }
    }

    fn slot_mut(&mut self, status: TaskStatus) -> &mut usize {
        match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Downloading => &mut self.downloading,
            TaskStatus::Uploading => &mut self.uploading,
            TaskStatus::Processing => &mut self.processing,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
        }
    }

    /// Sum over all statuses. Equals `total` for any tally.
    pub fn sum(&self) -> usize {
        TaskStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// Records in a terminal status.
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    /// Fraction of finished records in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.finished() as f64 / self.total as f64
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending: {} | downloading: {} | uploading: {} | processing: {} | completed: {} | failed: {}",
            self.pending, self.downloading, self.uploading, self.processing, self.completed, self.failed
        )
    }
}

/// Outcome of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Records that never reached a terminal status (interrupted batch)
    pub unfinished: usize,
    /// Keys of failed records, in batch order
    pub failed_keys: Vec<TaskKey>,
}

impl BatchSummary {
    pub fn new(counts: StatusCounts, failed_keys: Vec<TaskKey>) -> Self {
        Self {
            total: counts.total,
            completed: counts.completed,
            failed: counts.failed,
            unfinished: counts.total - counts.finished(),
            failed_keys,
        }
    }

    /// True when every record completed.
    pub fn is_success(&self) -> bool {
        self.completed == self.total
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total: {} | completed: {} | failed: {}",
            self.total, self.completed, self.failed
        )?;
        if self.unfinished > 0 {
            write!(f, " | unfinished: {}", self.unfinished)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> TaskKey {
        TaskKey::parse(s).unwrap()
    }

    fn snapshot(status: TaskStatus) -> TaskSnapshot {
        TaskSnapshot {
            key: key("BV1"),
            index: 2,
            total: 5,
            status,
            created_at: Utc::now(),
            elapsed: Duration::from_secs(42),
            processing_elapsed: Some(Duration::from_secs(7)),
            remote_job_id: None,
            post_processing: false,
            error: None,
        }
    }

    #[test]
    fn test_tally_sums_to_total() {
        use TaskStatus::*;
        let counts = StatusCounts::tally([Pending, Failed, Completed, Completed, Processing]);

        assert_eq!(counts.total, 5);
        assert_eq!(counts.sum(), 5);
        assert_eq!(counts.get(Completed), 2);
        assert_eq!(counts.finished(), 3);
        assert!((counts.progress() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_from_counts() {
        use TaskStatus::*;
        let counts = StatusCounts::tally([Completed, Failed, Pending]);
        let summary = BatchSummary::new(counts, vec![key("BV2")]);

        assert_eq!(summary.unfinished, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.to_string(), "total: 3 | completed: 1 | failed: 1 | unfinished: 1");
    }

    #[test]
    fn test_snapshot_display() {
        assert_eq!(
            snapshot(TaskStatus::Processing).to_string(),
            "[2/5] BV1 | status: processing | processing: 7s"
        );

        let mut failed = snapshot(TaskStatus::Failed);
        failed.error = Some("boom".into());
        assert_eq!(
            failed.to_string(),
            "[2/5] BV1 | status: failed | total: 42s | error: boom"
        );

        assert_eq!(
            snapshot(TaskStatus::Downloading).to_string(),
            "[2/5] BV1 | status: downloading | elapsed: 42s"
        );
    }
}
