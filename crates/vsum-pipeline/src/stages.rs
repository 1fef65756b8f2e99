//! Upload and monitor stage workers.
//!
//! `upload_stage`/`monitor_stage` are the happy paths and return errors
//! with `?`. The `run_*` wrappers form the worker boundary: they catch
//! errors and panics, record the outcome on the task and never fail
//! themselves.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Instrument};
use vsum_models::{TaskKey, TaskStatus};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::TaskLogger;
use crate::metrics::record_stage;
use crate::poller::LongPoller;
use crate::retry::retry_async;
use crate::services::PipelineServices;
use crate::task::TaskRecord;

/// Immutable context shared by every stage worker of a batch.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub config: Arc<PipelineConfig>,
    pub services: PipelineServices,
    pub poller: LongPoller,
    pub stop: CancellationToken,
}

impl StageContext {
    pub fn new(config: Arc<PipelineConfig>, services: PipelineServices, stop: CancellationToken) -> Self {
        let poller = LongPoller::new(
            Arc::clone(&services.remote),
            config.poll_retry.clone(),
            stop.clone(),
        );
        Self {
            config,
            services,
            poller,
            stop,
        }
    }

    /// Step boundary: refuse to start the next step once stopped.
    ///
    /// A step that already started always runs to completion, so a
    /// collaborator call is never dropped halfway.
    fn checkpoint(&self) -> PipelineResult<()> {
        if self.stop.is_cancelled() {
            return Err(PipelineError::Interrupted);
        }
        Ok(())
    }
}

/// Object name for a published file: `{prefix}/{key}_{file_name}`.
pub fn object_name(prefix: &str, key: &TaskKey, path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| key.to_string());

    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{}_{}", key, file_name)
    } else {
        format!("{}/{}_{}", prefix, key, file_name)
    }
}

/// Acquire, publish and submit one task.
///
/// On success the task is `Processing` with its remote job id recorded.
/// A stop is honored only between steps.
pub async fn upload_stage(ctx: &StageContext, task: &TaskRecord, logger: &TaskLogger) -> PipelineResult<()> {
    let config = &ctx.config;
    let services = &ctx.services;
    let key = task.key();

    ctx.checkpoint()?;
    task.update_status(TaskStatus::Downloading, None);
    let path = retry_async(
        &config.request_retry.named("acquire"),
        PipelineError::is_transient,
        || services.source.acquire(key),
    )
    .await?;
    task.set_local_path(path.clone());
    logger.log_progress(&format!("acquired {}", path.display()));

    ctx.checkpoint()?;
    task.update_status(TaskStatus::Uploading, None);
    let name = object_name(&config.object_prefix, key, &path);
    let url = retry_async(
        &config.request_retry.named("publish"),
        PipelineError::is_transient,
        || services.store.publish(&path, &name, config.url_ttl),
    )
    .await?;
    logger.log_progress(&format!("published as {}", name));

    if !config.retain_local {
        release_local(ctx, task).await;
    }

    ctx.checkpoint()?;
    let job_id = retry_async(
        &config.request_retry.named("submit"),
        PipelineError::is_transient,
        || services.remote.submit(&url, &config.submit_options),
    )
    .await?;

    // A submitted job is recorded even if a stop arrived meanwhile.
    task.record_submission(job_id);
    Ok(())
}

/// Wait for the remote job of one task and hand its result to the sink.
pub async fn monitor_stage(ctx: &StageContext, task: &TaskRecord, logger: &TaskLogger) -> PipelineResult<()> {
    let key = task.key();
    let job_id = task
        .remote_job_id()
        .ok_or_else(|| PipelineError::MissingJobId(key.to_string()))?;

    let result = ctx
        .poller
        .wait_for_result(&job_id, ctx.config.poll_timeout, ctx.config.poll_interval)
        .await?;

    task.set_post_processing(true);
    logger.log_progress("remote job finished, writing results");
    ctx.services.sink.on_finished(key, &job_id, &result).await?;

    task.update_status(TaskStatus::Completed, None);
    Ok(())
}

/// Upload worker boundary. Returns `true` when the task is ready for
/// monitoring.
pub async fn run_upload(ctx: &StageContext, task: &Arc<TaskRecord>) -> bool {
    let logger = TaskLogger::new(task.key(), "upload");
    logger.log_start(&format!("task {}/{}", task.index(), task.total()));

    let started = Instant::now();
    let outcome = guarded(upload_stage(ctx, task, &logger))
        .instrument(logger.create_span())
        .await;
    let seconds = started.elapsed().as_secs_f64();

    match outcome {
        Ok(()) => {
            let job_id = task.remote_job_id().map(|id| id.to_string()).unwrap_or_default();
            logger.log_completion(&format!("submitted as {}", job_id));
            record_stage("upload", "ok", seconds);
            true
        }
        Err(e) => {
            if !ctx.config.retain_local {
                release_local(ctx, task).await;
            }
            settle_failure(task, &logger, "upload", &e, seconds);
            false
        }
    }
}

/// Monitor worker boundary.
pub async fn run_monitor(ctx: &StageContext, task: &Arc<TaskRecord>) {
    let logger = TaskLogger::new(task.key(), "monitor");
    logger.log_start("waiting for remote job");

    let started = Instant::now();
    let outcome = guarded(monitor_stage(ctx, task, &logger))
        .instrument(logger.create_span())
        .await;
    let seconds = started.elapsed().as_secs_f64();

    match outcome {
        Ok(()) => {
            logger.log_completion("results written");
            record_stage("monitor", "ok", seconds);
        }
        Err(e) => settle_failure(task, &logger, "monitor", &e, seconds),
    }
}

/// Turn a panic inside a stage into an error.
async fn guarded(fut: impl Future<Output = PipelineResult<()>>) -> PipelineResult<()> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(PipelineError::Panicked(detail))
        }
    }
}

fn settle_failure(task: &TaskRecord, logger: &TaskLogger, stage: &str, err: &PipelineError, seconds: f64) {
    let outcome = if err.is_interrupted() {
        logger.log_warning("interrupted");
        "interrupted"
    } else {
        logger.log_error(&err.to_string());
        "failed"
    };
    task.fail(err.to_string());
    record_stage(stage, outcome, seconds);
}

async fn release_local(ctx: &StageContext, task: &TaskRecord) {
    if let Some(path) = task.take_local_path() {
        if let Err(e) = ctx.services.source.release(&path).await {
            warn!(
                task_key = %task.key(),
                path = %path.display(),
                "Failed to release local file: {}", e
            );
        }
    }
}
