//! Per-task mutable state with synchronized transitions.
//!
//! A [`TaskRecord`] is shared (`Arc`) between the registry, the stage worker
//! currently driving it and any status reader. Identity fields are fixed at
//! creation; everything else lives behind the record's own lock, so writes to
//! one record are totally ordered without a registry-wide lock.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::warn;
use vsum_models::{RemoteJobId, TaskKey, TaskSnapshot, TaskStatus};

/// One job of a batch.
#[derive(Debug)]
pub struct TaskRecord {
    key: TaskKey,
    index: usize,
    total: usize,
    created_at: DateTime<Utc>,
    created: Instant,
    state: RwLock<TaskState>,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    remote_job_id: Option<RemoteJobId>,
    local_path: Option<PathBuf>,
    error: Option<String>,
    processing_started: Option<Instant>,
    finished: Option<Instant>,
    post_processing: bool,
}

impl TaskState {
    fn new() -> Self {
        Self {
            status: TaskStatus::Pending,
            remote_job_id: None,
            local_path: None,
            error: None,
            processing_started: None,
            finished: None,
            post_processing: false,
        }
    }

    fn apply(&mut self, status: TaskStatus, error: Option<String>) {
        self.status = status;
        if error.is_some() {
            self.error = error;
        }

        let now = Instant::now();
        if status == TaskStatus::Processing && self.processing_started.is_none() {
            self.processing_started = Some(now);
        }
        if status.is_terminal() {
            self.finished.get_or_insert(now);
            self.post_processing = false;
        }
    }
}

impl TaskRecord {
    /// Create a pending record.
    pub fn new(key: TaskKey, index: usize, total: usize) -> Self {
        Self {
            key,
            index,
            total,
            created_at: Utc::now(),
            created: Instant::now(),
            state: RwLock::new(TaskState::new()),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    /// 1-based position in the batch.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn read(&self) -> RwLockReadGuard<'_, TaskState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TaskState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the record to `status`.
    ///
    /// Supplying an `error` stores it and forces `Failed`. Moving backwards
    /// or out of a terminal status is ignored and logged; the return value
    /// tells whether the transition was applied.
    pub fn update_status(&self, status: TaskStatus, error: Option<String>) -> bool {
        let target = if error.is_some() {
            TaskStatus::Failed
        } else {
            status
        };

        let mut state = self.write();
        if !state.status.can_transition_to(target) {
            warn!(
                task_key = %self.key,
                from = %state.status,
                to = %target,
                "Ignoring invalid status transition"
            );
            return false;
        }

        state.apply(target, error);
        true
    }

    /// Mark the record failed with a message.
    pub fn fail(&self, error: impl Into<String>) -> bool {
        self.update_status(TaskStatus::Failed, Some(error.into()))
    }

    /// Store the remote job id and enter `Processing` in one step.
    pub fn record_submission(&self, job_id: RemoteJobId) -> bool {
        let mut state = self.write();
        if !state.status.can_transition_to(TaskStatus::Processing) {
            warn!(
                task_key = %self.key,
                from = %state.status,
                job_id = %job_id,
                "Ignoring submission for a record that cannot enter processing"
            );
            return false;
        }

        state.remote_job_id = Some(job_id);
        state.apply(TaskStatus::Processing, None);
        true
    }

    pub fn status(&self) -> TaskStatus {
        self.read().status
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn remote_job_id(&self) -> Option<RemoteJobId> {
        self.read().remote_job_id.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.read().error.clone()
    }

    pub fn set_local_path(&self, path: PathBuf) {
        self.write().local_path = Some(path);
    }

    pub fn local_path(&self) -> Option<PathBuf> {
        self.read().local_path.clone()
    }

    /// Clear and return the local resource handle.
    pub fn take_local_path(&self) -> Option<PathBuf> {
        self.write().local_path.take()
    }

    /// Flag result handling in progress. Ignored once terminal.
    pub fn set_post_processing(&self, active: bool) {
        let mut state = self.write();
        if !state.status.is_terminal() {
            state.post_processing = active;
        }
    }

    /// Immutable view for status consumers.
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.read();
        let now = Instant::now();

        let elapsed = state.finished.unwrap_or(now).duration_since(self.created);
        let processing_elapsed = match (state.status, state.processing_started) {
            (TaskStatus::Processing, Some(started)) => Some(now.duration_since(started)),
            _ => None,
        };

        TaskSnapshot {
            key: self.key.clone(),
            index: self.index,
            total: self.total,
            status: state.status,
            created_at: self.created_at,
            elapsed,
            processing_elapsed,
            remote_job_id: state.remote_job_id.clone(),
            post_processing: state.post_processing,
            error: state.error.clone(),
        }
    }
}
