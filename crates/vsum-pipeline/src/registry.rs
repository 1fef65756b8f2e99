//! Registry of the task records of one batch.

use std::sync::Arc;

use vsum_models::{BatchSummary, StatusCounts, TaskKey, TaskSnapshot, TaskStatus};

use crate::queue::TaskQueue;
use crate::task::TaskRecord;

/// Owns every record of a batch plus the two queues between stages.
///
/// The record list is fixed at seeding, so aggregate reads walk it without a
/// collection lock and only take each record's own lock briefly.
#[derive(Debug)]
pub struct TaskRegistry {
    records: Vec<Arc<TaskRecord>>,
    work_queue: TaskQueue,
    handoff_queue: TaskQueue,
}

impl TaskRegistry {
    /// Create one pending record per key, in order.
    ///
    /// The work queue receives every record in the same order and is closed;
    /// the hand-off queue starts empty and open.
    pub fn seed<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = TaskKey>,
    {
        let keys: Vec<TaskKey> = keys.into_iter().collect();
        let total = keys.len();

        let records: Vec<Arc<TaskRecord>> = keys
            .into_iter()
            .enumerate()
            .map(|(i, key)| Arc::new(TaskRecord::new(key, i + 1, total)))
            .collect();

        let work_queue = TaskQueue::new("work");
        for record in &records {
            work_queue.push(Arc::clone(record));
        }
        work_queue.close();

        Self {
            records,
            work_queue,
            handoff_queue: TaskQueue::new("handoff"),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Arc<TaskRecord>] {
        &self.records
    }

    /// First record with the given key.
    pub fn get(&self, key: &str) -> Option<&Arc<TaskRecord>> {
        self.records.iter().find(|r| r.key().as_str() == key)
    }

    pub fn work_queue(&self) -> &TaskQueue {
        &self.work_queue
    }

    pub fn handoff_queue(&self) -> &TaskQueue {
        &self.handoff_queue
    }

    /// Per-status counts. Always sums to the batch size.
    pub fn counts(&self) -> StatusCounts {
        StatusCounts::tally(self.records.iter().map(|r| r.status()))
    }

    /// Every record terminal.
    pub fn all_done(&self) -> bool {
        self.records.iter().all(|r| r.is_terminal())
    }

    /// Keys of failed records, in batch order.
    pub fn failed_keys(&self) -> Vec<TaskKey> {
        self.records
            .iter()
            .filter(|r| r.status() == TaskStatus::Failed)
            .map(|r| r.key().clone())
            .collect()
    }

    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        self.records.iter().map(|r| r.snapshot()).collect()
    }

    pub fn summary(&self) -> BatchSummary {
        let snapshots = self.snapshots();
        let counts = StatusCounts::tally(snapshots.iter().map(|s| s.status));
        let failed_keys = snapshots
            .into_iter()
            .filter(|s| s.status == TaskStatus::Failed)
            .map(|s| s.key)
            .collect();
        BatchSummary::new(counts, failed_keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(raw: &[&str]) -> Vec<TaskKey> {
        raw.iter().map(|k| TaskKey::parse(k).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_seed_fills_and_closes_work_queue() {
        let registry = TaskRegistry::seed(keys(&["a", "b", "c"]));

        assert_eq!(registry.len(), 3);
        assert!(registry.work_queue().is_closed());
        assert!(!registry.handoff_queue().is_closed());

        let mut order = Vec::new();
        while let Some(task) = registry.work_queue().pop().await {
            order.push((task.key().to_string(), task.index(), task.total()));
        }
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 1, 3),
                ("b".to_string(), 2, 3),
                ("c".to_string(), 3, 3)
            ]
        );
    }

    #[test]
    fn test_counts_and_failed_keys() {
        let registry = TaskRegistry::seed(keys(&["a", "b", "c", "d"]));
        registry.get("a").unwrap().update_status(TaskStatus::Completed, None);
        registry.get("c").unwrap().fail("boom");
        registry.get("b").unwrap().update_status(TaskStatus::Uploading, None);

        let counts = registry.counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.uploading, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.sum(), 4);
        assert_eq!(counts.total, 4);

        assert_eq!(registry.failed_keys(), keys(&["c"]));
        assert!(!registry.all_done());
    }

    #[test]
    fn test_all_done_and_summary() {
        let registry = TaskRegistry::seed(keys(&["a", "b"]));
        registry.get("a").unwrap().update_status(TaskStatus::Completed, None);
        registry.get("b").unwrap().fail("nope");

        assert!(registry.all_done());
        let summary = registry.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.unfinished, 0);
        assert_eq!(summary.failed_keys, keys(&["b"]));
    }

    #[test]
    fn test_empty_batch_is_done() {
        let registry = TaskRegistry::seed(Vec::new());
        assert!(registry.is_empty());
        assert!(registry.all_done());
        assert_eq!(registry.counts().sum(), 0);
    }

    #[test]
    fn test_get_unknown_key() {
        let registry = TaskRegistry::seed(keys(&["a"]));
        assert!(registry.get("zzz").is_none());
    }
}
