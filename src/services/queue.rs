//! Work queue shared by the workers of one page.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::Row;

/// Thread-safe FIFO of rows awaiting embedding.
///
/// The queue holds raw rows; chunking happens after a worker takes a row.
/// `take` hands each row to exactly one caller.
#[derive(Debug, Default)]
pub struct WorkQueue {
    rows: Mutex<VecDeque<Row>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row to the back of the queue.
    pub fn push(&self, row: Row) {
        self.lock().push_back(row);
    }

    /// Append several rows, returning how many were added.
    pub fn extend(&self, rows: impl IntoIterator<Item = Row>) -> usize {
        let mut queue = self.lock();
        let before = queue.len();
        queue.extend(rows);
        queue.len() - before
    }

    /// Remove the row at the front of the queue.
    pub fn take(&self) -> Option<Row> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Row>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new();
        queue.push(Row::new(1, "a"));
        queue.push(Row::new(2, "b"));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.take().map(|r| r.id), Some(1));
        assert_eq!(queue.take().map(|r| r.id), Some(2));
        assert!(queue.take().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_extend_counts_rows() {
        let queue = WorkQueue::new();
        let added = queue.extend((0..5).map(|i| Row::new(i, "x")));
        assert_eq!(added, 5);
        assert_eq!(queue.len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_take_delivers_each_row_once() {
        let queue = Arc::new(WorkQueue::new());
        queue.extend((0..1000).map(|i| Row::new(i, "text")));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut taken = Vec::new();
                while let Some(row) = queue.take() {
                    taken.push(row.id);
                    tokio::task::yield_now().await;
                }
                taken
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.await.unwrap() {
                total += 1;
                assert!(seen.insert(id), "row {id} delivered twice");
            }
        }
        assert_eq!(total, 1000);
        assert!(queue.is_empty());
    }
}
