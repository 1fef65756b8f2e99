//! Batch orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vsum_models::{BatchSummary, TaskStatus};

use crate::config::{PipelineConfig, PipelineMode};
use crate::error::{PipelineError, PipelineResult};
use crate::registry::TaskRegistry;
use crate::services::PipelineServices;
use crate::stages::{run_monitor, run_upload, StageContext};
use crate::status::StatusReporter;

/// Drives every task of a registry through upload and monitoring.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    services: PipelineServices,
    registry: Arc<TaskRegistry>,
    stop: CancellationToken,
    started: AtomicBool,
    run_id: String,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, services: PipelineServices, registry: Arc<TaskRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            services,
            registry,
            stop: CancellationToken::new(),
            started: AtomicBool::new(false),
            run_id: format!("batch-{}", Uuid::new_v4()),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Token that stops the batch when cancelled.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Request a stop. A running upload step finishes and no further step
    /// starts; monitor waits end at once.
    pub fn stop(&self) {
        info!(run_id = %self.run_id, "Stop requested");
        self.stop.cancel();
    }

    /// Cancel the batch on Ctrl-C.
    pub fn stop_on_ctrl_c(&self) -> JoinHandle<()> {
        let stop = self.stop.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {}
                result = tokio::signal::ctrl_c() => match result {
                    Ok(()) => {
                        warn!("Ctrl-C received, stopping batch");
                        stop.cancel();
                    }
                    Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                },
            }
        })
    }

    /// Run the batch to completion.
    ///
    /// Returns the summary once every task is terminal, or
    /// [`PipelineError::Interrupted`] after a stop. In the latter case the
    /// registry still yields a summary via [`TaskRegistry::summary`].
    pub async fn run(&self) -> PipelineResult<BatchSummary> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::invalid_input("pipeline already ran"));
        }

        let workers = self.config.workers();
        info!(
            run_id = %self.run_id,
            tasks = self.registry.len(),
            workers,
            mode = self.config.mode.as_str(),
            "Starting pipeline"
        );
        let started = Instant::now();

        let ctx = Arc::new(StageContext::new(
            Arc::clone(&self.config),
            self.services.clone(),
            self.stop.clone(),
        ));

        let reporter_stop = self.stop.child_token();
        let reporter = StatusReporter::spawn(
            Arc::clone(&self.registry),
            self.config.status_interval,
            reporter_stop.clone(),
        );

        match self.config.mode {
            PipelineMode::Pipelined => self.run_pipelined(&ctx, workers).await,
            PipelineMode::Sequential => self.run_sequential(&ctx, workers).await,
        }

        reporter_stop.cancel();
        if let Err(e) = reporter.await {
            warn!("Status reporter ended abnormally: {}", e);
        }
        StatusReporter::report(&self.registry);

        if self.stop.is_cancelled() {
            let interrupted = self.fail_in_flight();
            let summary = self.registry.summary();
            warn!(
                run_id = %self.run_id,
                interrupted,
                elapsed_secs = started.elapsed().as_secs(),
                "Pipeline interrupted: {}", summary
            );
            return Err(PipelineError::Interrupted);
        }

        let summary = self.registry.summary();
        info!(
            run_id = %self.run_id,
            elapsed_secs = started.elapsed().as_secs(),
            "Pipeline finished: {}", summary
        );
        if !summary.failed_keys.is_empty() {
            let keys: Vec<&str> = summary.failed_keys.iter().map(|k| k.as_str()).collect();
            warn!(run_id = %self.run_id, "Failed tasks: {}", keys.join(", "));
        }
        Ok(summary)
    }

    /// Uploads and monitoring overlap.
    async fn run_pipelined(&self, ctx: &Arc<StageContext>, workers: usize) {
        let dispatcher = tokio::spawn(dispatch_monitors(
            Arc::clone(ctx),
            Arc::clone(&self.registry),
            workers,
        ));

        self.run_uploads(ctx, workers).await;

        if let Err(e) = dispatcher.await {
            error!("Monitor dispatcher aborted: {}", e);
        }
    }

    /// Every upload finishes before the first monitor starts.
    async fn run_sequential(&self, ctx: &Arc<StageContext>, workers: usize) {
        self.run_uploads(ctx, workers).await;
        info!(run_id = %self.run_id, "Upload phase finished, monitoring");
        dispatch_monitors(Arc::clone(ctx), Arc::clone(&self.registry), workers).await;
    }

    /// Run the upload pool to completion, then close the hand-off queue.
    async fn run_uploads(&self, ctx: &Arc<StageContext>, workers: usize) {
        let mut uploads = JoinSet::new();
        for worker_id in 0..workers {
            uploads.spawn(upload_worker(
                worker_id,
                Arc::clone(ctx),
                Arc::clone(&self.registry),
            ));
        }

        while let Some(joined) = uploads.join_next().await {
            if let Err(e) = joined {
                error!("Upload worker aborted: {}", e);
            }
        }
        self.registry.handoff_queue().close();
    }

    /// Fail every record left mid-pipeline by a stop.
    fn fail_in_flight(&self) -> usize {
        self.registry
            .records()
            .iter()
            .filter(|r| {
                matches!(
                    r.status(),
                    TaskStatus::Downloading | TaskStatus::Uploading | TaskStatus::Processing
                )
            })
            .filter(|r| r.fail(PipelineError::Interrupted.to_string()))
            .count()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("run_id", &self.run_id)
            .field("config", &self.config)
            .field("tasks", &self.registry.len())
            .finish_non_exhaustive()
    }
}

async fn upload_worker(worker_id: usize, ctx: Arc<StageContext>, registry: Arc<TaskRegistry>) {
    debug!(worker_id, "Upload worker started");
    while let Some(task) = registry.work_queue().pop_or_stop(&ctx.stop).await {
        if run_upload(&ctx, &task).await && !registry.handoff_queue().push(Arc::clone(&task)) {
            task.fail("hand-off queue closed");
        }
    }
    debug!(worker_id, "Upload worker finished");
}

/// Drain the hand-off queue into a pool of at most `width` monitors.
async fn dispatch_monitors(ctx: Arc<StageContext>, registry: Arc<TaskRegistry>, width: usize) {
    let semaphore = Arc::new(Semaphore::new(width));
    let mut monitors = JoinSet::new();

    while let Some(task) = registry.handoff_queue().pop_or_stop(&ctx.stop).await {
        let permit = tokio::select! {
            biased;
            _ = ctx.stop.cancelled() => {
                task.fail(PipelineError::Interrupted.to_string());
                break;
            }
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let ctx = Arc::clone(&ctx);
        monitors.spawn(async move {
            let _permit = permit;
            run_monitor(&ctx, &task).await;
        });

        while let Some(joined) = monitors.try_join_next() {
            if let Err(e) = joined {
                error!("Monitor task aborted: {}", e);
            }
        }
    }

    while let Some(joined) = monitors.join_next().await {
        if let Err(e) = joined {
            error!("Monitor task aborted: {}", e);
        }
    }
}
