//! Closable multi-producer, multi-consumer FIFO of task records.
//!
//! Producers push through an mpsc sender kept behind a short lock so the
//! queue can be closed by dropping it. Consumers share the receiver behind
//! an async mutex; a pop waits until an item arrives or the queue is closed
//! and drained.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::task::TaskRecord;

#[derive(Debug)]
pub struct TaskQueue {
    name: &'static str,
    tx: Mutex<Option<mpsc::UnboundedSender<Arc<TaskRecord>>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Arc<TaskRecord>>>,
    len: AtomicUsize,
}

impl TaskQueue {
    pub fn new(name: &'static str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name,
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            len: AtomicUsize::new(0),
        }
    }

    /// Append a record. Returns `false` if the queue is already closed.
    pub fn push(&self, task: Arc<TaskRecord>) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => {
                self.len.fetch_add(1, Ordering::SeqCst);
                if tx.send(task).is_err() {
                    self.len.fetch_sub(1, Ordering::SeqCst);
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// No further pushes; pending items stay poppable.
    pub fn close(&self) {
        let closed = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        if closed {
            debug!(queue = self.name, pending = self.len(), "Queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Next record, or `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Arc<TaskRecord>> {
        let task = self.rx.lock().await.recv().await;
        if task.is_some() {
            self.len.fetch_sub(1, Ordering::SeqCst);
        }
        task
    }

    /// Like [`pop`](Self::pop), but gives up with `None` when `stop` fires.
    pub async fn pop_or_stop(&self, stop: &CancellationToken) -> Option<Arc<TaskRecord>> {
        if stop.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = stop.cancelled() => None,
            task = self.pop() => task,
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vsum_models::TaskKey;

    fn task(key: &str, index: usize) -> Arc<TaskRecord> {
        Arc::new(TaskRecord::new(TaskKey::parse(key).unwrap(), index, 3))
    }

    #[tokio::test]
    async fn test_fifo_order_and_close() {
        let queue = TaskQueue::new("work");
        assert!(queue.push(task("a", 1)));
        assert!(queue.push(task("b", 2)));
        queue.close();

        assert!(!queue.push(task("c", 3)));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().await.unwrap().key().as_str(), "a");
        assert_eq!(queue.pop().await.unwrap().key().as_str(), "b");
        assert!(queue.pop().await.is_none());
        assert!(queue.is_empty());

        queue.close();
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(TaskQueue::new("handoff"));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        queue.push(task("late", 1));

        let popped = consumer.await.unwrap().unwrap();
        assert_eq!(popped.key().as_str(), "late");
    }

    #[tokio::test]
    async fn test_multiple_consumers_see_each_item_once() {
        let queue = Arc::new(TaskQueue::new("work"));
        for i in 0..20 {
            queue.push(task(&format!("k{}", i), i + 1));
        }
        queue.close();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(t) = queue.pop().await {
                    seen.push(t.index());
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pop_or_stop_returns_on_cancel() {
        let queue = TaskQueue::new("handoff");
        let stop = CancellationToken::new();

        let canceller = {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                stop.cancel();
            })
        };

        assert!(queue.pop_or_stop(&stop).await.is_none());
        canceller.await.unwrap();
    }
}
