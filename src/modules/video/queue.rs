use super::model::VideoJob;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Bounded FIFO of pending video jobs. Lives in memory only; pending jobs
/// are lost on restart.
pub struct VideoQueue {
    pending: Mutex<VecDeque<VideoJob>>,
    capacity: usize,
}

impl VideoQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<VideoJob>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends `job`; returns `false` when the queue is full.
    pub fn enqueue(&self, job: VideoJob) -> bool {
        let mut pending = self.lock();
        if pending.len() >= self.capacity {
            warn!(path = %job.source_path.display(), "Video queue full, dropping job");
            return false;
        }
        pending.push_back(job);
        true
    }

    pub fn dequeue(&self) -> Option<VideoJob> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
