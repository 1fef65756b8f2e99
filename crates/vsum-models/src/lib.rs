//! Shared data models for the vsum task pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Task keys and lifecycle statuses
//! - Remote job ids, remote states and poll responses
//! - Submission options
//! - Snapshots, per-status counts and batch summaries

pub mod remote;
pub mod snapshot;
pub mod task;

// Re-export common types
pub use remote::{PollResponse, RemoteJobId, RemoteState, SubmitOptions, SuccessAlias};
pub use snapshot::{BatchSummary, StatusCounts, TaskSnapshot};
pub use task::{KeyError, TaskKey, TaskStatus};
