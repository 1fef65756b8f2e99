//! Collaborators the pipeline drives.
//!
//! Each stage talks to the outside world only through these traits, so the
//! scheduling logic can be exercised with in-memory fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vsum_models::{PollResponse, RemoteJobId, SubmitOptions, TaskKey};

use crate::error::{PipelineError, PipelineResult};

/// Produces the local input file for a key.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Fetch the input for `key` and return its local path.
    async fn acquire(&self, key: &TaskKey) -> PipelineResult<PathBuf>;

    /// Drop a local file once it is no longer needed.
    async fn release(&self, path: &Path) -> PipelineResult<()> {
        tokio::fs::remove_file(path).await?;
        debug!(path = %path.display(), "Released local file");
        Ok(())
    }
}

/// Publishes a local file and hands back a time-limited retrieval URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn publish(&self, path: &Path, object_name: &str, ttl: Duration) -> PipelineResult<String>;
}

/// The remote processing service.
#[async_trait]
pub trait RemoteProcessor: Send + Sync {
    async fn submit(&self, url: &str, options: &SubmitOptions) -> PipelineResult<RemoteJobId>;

    /// Fetch the current status of a job. Transport hiccups should surface
    /// as [`PipelineError::TransientFetch`] so they are retried.
    async fn poll(&self, job_id: &RemoteJobId) -> PipelineResult<PollResponse>;
}

/// Consumes the result of a finished remote job.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn on_finished(
        &self,
        key: &TaskKey,
        job_id: &RemoteJobId,
        result: &serde_json::Value,
    ) -> PipelineResult<()>;
}

/// Writes each result as pretty JSON to `{dir}/{key}.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &TaskKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn on_finished(
        &self,
        key: &TaskKey,
        job_id: &RemoteJobId,
        result: &serde_json::Value,
    ) -> PipelineResult<()> {
        let document = serde_json::json!({
            "key": key,
            "job_id": job_id,
            "result": result,
        });
        let body = serde_json::to_vec_pretty(&document)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PipelineError::result_write(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.path_for(key);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| PipelineError::result_write(format!("{}: {}", path.display(), e)))?;

        debug!(task_key = %key, path = %path.display(), "Result written");
        Ok(())
    }
}

/// Shared handles to every collaborator.
#[derive(Clone)]
pub struct PipelineServices {
    pub source: Arc<dyn InputSource>,
    pub store: Arc<dyn ObjectStore>,
    pub remote: Arc<dyn RemoteProcessor>,
    pub sink: Arc<dyn ResultSink>,
}

impl PipelineServices {
    pub fn new(
        source: Arc<dyn InputSource>,
        store: Arc<dyn ObjectStore>,
        remote: Arc<dyn RemoteProcessor>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            source,
            store,
            remote,
            sink,
        }
    }
}

impl std::fmt::Debug for PipelineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineServices").finish_non_exhaustive()
    }
}
