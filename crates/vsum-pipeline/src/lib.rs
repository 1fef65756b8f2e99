//! Two-stage batch pipeline.
//!
//! This crate provides:
//! - Per-task records with synchronized status transitions
//! - A task registry with aggregate queries
//! - Retry with exponential backoff and a long-poll waiter
//! - Upload and monitor stage workers behind collaborator traits
//! - A pipelined or sequential orchestrator with cooperative stop
//! - Status reporting, key list I/O and structured logging

pub mod config;
pub mod error;
pub mod keys;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod queue;
pub mod registry;
pub mod retry;
pub mod services;
pub mod stages;
pub mod status;
pub mod task;

pub use config::{PipelineConfig, PipelineMode};
pub use error::{PipelineError, PipelineResult};
pub use keys::{parse_key_list, read_key_file, write_failed_keys};
pub use logging::{init_tracing, TaskLogger};
pub use orchestrator::Pipeline;
pub use poller::LongPoller;
pub use queue::TaskQueue;
pub use registry::TaskRegistry;
pub use retry::{retry_async, retry_async_with, RetryConfig, RetryError};
pub use services::{InputSource, JsonFileSink, ObjectStore, PipelineServices, RemoteProcessor, ResultSink};
pub use stages::StageContext;
pub use status::StatusReporter;
pub use task::TaskRecord;
