//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use vsum_models::{PollResponse, RemoteJobId, SubmitOptions, TaskKey};
use vsum_pipeline::{
    InputSource, ObjectStore, PipelineConfig, PipelineError, PipelineResult, PipelineServices,
    RemoteProcessor, ResultSink, RetryConfig, TaskRegistry,
};

/// Ordered log of collaborator calls, shared by every fake.
#[derive(Debug, Default, Clone)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn positions_with_prefix(&self, prefix: &str) -> Vec<usize> {
        self.events()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.starts_with(prefix))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Hands out virtual paths after an optional delay.
#[derive(Default)]
pub struct FakeSource {
    pub log: EventLog,
    pub delay: Duration,
    pub failing: HashSet<String>,
    pub panicking: HashSet<String>,
    pub released: Mutex<Vec<PathBuf>>,
    /// Acquire calls that ran to the end
    pub completed: AtomicUsize,
}

impl FakeSource {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InputSource for FakeSource {
    async fn acquire(&self, key: &TaskKey) -> PipelineResult<PathBuf> {
        self.log.push(format!("acquire:{}", key));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panicking.contains(key.as_str()) {
            panic!("source exploded for {}", key);
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(key.as_str()) {
            return Err(PipelineError::acquisition(format!("{} is unavailable", key)));
        }
        Ok(PathBuf::from(format!("/virtual/{}.mp4", key)))
    }

    async fn release(&self, path: &Path) -> PipelineResult<()> {
        self.released.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub log: EventLog,
    pub objects: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn publish(&self, _path: &Path, object_name: &str, _ttl: Duration) -> PipelineResult<String> {
        self.log.push(format!("publish:{}", object_name));
        self.objects.lock().unwrap().push(object_name.to_string());
        Ok(format!("https://store.test/{}", object_name))
    }
}

/// How the fake remote treats the job of one key.
#[derive(Debug, Clone, Copy)]
pub enum RemoteBehavior {
    /// `ONGOING` for this many polls, then `COMPLETED`
    CompleteAfter(u32),
    /// `ONGOING` forever
    Hang,
    /// `FAILED` on the first poll
    Fail,
}

pub struct FakeRemote {
    pub log: EventLog,
    pub submit_delay: Duration,
    pub default_behavior: RemoteBehavior,
    pub behaviors: HashMap<String, RemoteBehavior>,
    jobs: Mutex<HashMap<String, (String, u32)>>,
}

impl FakeRemote {
    pub fn new(log: EventLog, default_behavior: RemoteBehavior) -> Self {
        Self {
            log,
            submit_delay: Duration::ZERO,
            default_behavior,
            behaviors: HashMap::new(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_behavior(mut self, key: &str, behavior: RemoteBehavior) -> Self {
        self.behaviors.insert(key.to_string(), behavior);
        self
    }
}

#[async_trait]
impl RemoteProcessor for FakeRemote {
    async fn submit(&self, url: &str, _options: &SubmitOptions) -> PipelineResult<RemoteJobId> {
        // URLs look like https://store.test/videos/{key}_{key}.mp4
        let object = url.rsplit('/').next().unwrap_or_default();
        let key = object.split('_').next().unwrap_or_default().to_string();

        self.log.push(format!("submit:{}", key));
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        let job_id = format!("job-{}", key);
        self.jobs.lock().unwrap().insert(job_id.clone(), (key, 0));
        Ok(RemoteJobId::new(job_id))
    }

    async fn poll(&self, job_id: &RemoteJobId) -> PipelineResult<PollResponse> {
        let (key, polls) = {
            let mut jobs = self.jobs.lock().unwrap();
            let entry = jobs
                .get_mut(job_id.as_str())
                .ok_or_else(|| PipelineError::fatal_fetch(format!("unknown job {}", job_id)))?;
            entry.1 += 1;
            (entry.0.clone(), entry.1)
        };
        self.log.push(format!("poll:{}", key));

        let behavior = self
            .behaviors
            .get(&key)
            .copied()
            .unwrap_or(self.default_behavior);
        let response = match behavior {
            RemoteBehavior::CompleteAfter(n) if polls > n => {
                PollResponse::status("COMPLETED").with_result(serde_json::json!({ "key": key }))
            }
            RemoteBehavior::Fail => PollResponse::status("FAILED").with_error_message("transcoding failed"),
            _ => PollResponse::status("ONGOING"),
        };
        Ok(response)
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub log: EventLog,
    pub failing: HashSet<String>,
    pub results: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl ResultSink for FakeSink {
    async fn on_finished(
        &self,
        key: &TaskKey,
        _job_id: &RemoteJobId,
        result: &serde_json::Value,
    ) -> PipelineResult<()> {
        self.log.push(format!("finish:{}", key));
        if self.failing.contains(key.as_str()) {
            return Err(PipelineError::result_write("disk full"));
        }
        self.results
            .lock()
            .unwrap()
            .push((key.to_string(), result.clone()));
        Ok(())
    }
}

pub struct Fakes {
    pub log: EventLog,
    pub source: Arc<FakeSource>,
    pub store: Arc<FakeStore>,
    pub remote: Arc<FakeRemote>,
    pub sink: Arc<FakeSink>,
}

impl Fakes {
    pub fn services(&self) -> PipelineServices {
        PipelineServices::new(
            self.source.clone(),
            self.store.clone(),
            self.remote.clone(),
            self.sink.clone(),
        )
    }
}

/// Builder for a set of fakes sharing one event log.
pub struct FakesBuilder {
    log: EventLog,
    source: FakeSource,
    remote: FakeRemote,
    sink: FakeSink,
}

impl FakesBuilder {
    pub fn new() -> Self {
        let log = EventLog::default();
        Self {
            source: FakeSource {
                log: log.clone(),
                ..Default::default()
            },
            remote: FakeRemote::new(log.clone(), RemoteBehavior::CompleteAfter(2)),
            sink: FakeSink {
                log: log.clone(),
                ..Default::default()
            },
            log,
        }
    }

    pub fn upload_delay(mut self, delay: Duration) -> Self {
        self.source.delay = delay;
        self
    }

    pub fn submit_delay(mut self, delay: Duration) -> Self {
        self.remote.submit_delay = delay;
        self
    }

    pub fn failing_upload(mut self, key: &str) -> Self {
        self.source.failing.insert(key.to_string());
        self
    }

    pub fn panicking_upload(mut self, key: &str) -> Self {
        self.source.panicking.insert(key.to_string());
        self
    }

    pub fn remote_default(mut self, behavior: RemoteBehavior) -> Self {
        self.remote.default_behavior = behavior;
        self
    }

    pub fn remote_behavior(mut self, key: &str, behavior: RemoteBehavior) -> Self {
        self.remote = self.remote.with_behavior(key, behavior);
        self
    }

    pub fn failing_sink(mut self, key: &str) -> Self {
        self.sink.failing.insert(key.to_string());
        self
    }

    pub fn build(self) -> Fakes {
        Fakes {
            store: Arc::new(FakeStore {
                log: self.log.clone(),
                ..Default::default()
            }),
            log: self.log,
            source: Arc::new(self.source),
            remote: Arc::new(self.remote),
            sink: Arc::new(self.sink),
        }
    }
}

pub fn keys(n: usize) -> Vec<TaskKey> {
    (1..=n)
        .map(|i| TaskKey::parse(&format!("BV{}", i)).unwrap())
        .collect()
}

pub fn registry(n: usize) -> Arc<TaskRegistry> {
    Arc::new(TaskRegistry::seed(keys(n)))
}

pub fn test_config(workers: usize) -> PipelineConfig {
    PipelineConfig {
        max_workers: workers,
        poll_interval: Duration::from_secs(1),
        poll_timeout: Duration::from_secs(600),
        request_retry: RetryConfig::new("request")
            .with_max_retries(1)
            .with_base_delay(Duration::from_millis(10)),
        poll_retry: RetryConfig::new("poll")
            .with_max_retries(1)
            .with_base_delay(Duration::from_millis(10)),
        status_interval: Duration::from_secs(1),
        ..Default::default()
    }
}
