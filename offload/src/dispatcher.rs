//! Pairing of pending tasks with available worker units.
//!
//! Two FIFO queues owned by the coordinator. Nothing here is shared, so
//! there is no locking; the coordinator pumps [`TaskQueue::next_dispatch`]
//! whenever either queue grows.

use std::collections::VecDeque;

use offload_api::WorkerId;

#[derive(Debug)]
pub struct TaskQueue<T> {
    pending: VecDeque<T>,
    available: VecDeque<WorkerId>,
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            available: VecDeque::new(),
        }
    }
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_task(&mut self, task: T) {
        self.pending.push_back(task);
    }

    /// Puts a retried task ahead of everything else.
    pub fn requeue_front(&mut self, task: T) {
        self.pending.push_front(task);
    }

    /// Announces a unit as ready for work. Announcing twice is a no-op.
    pub fn worker_available(&mut self, worker_id: WorkerId) {
        if !self.available.contains(&worker_id) {
            self.available.push_back(worker_id);
        }
    }

    pub fn remove_worker(&mut self, worker_id: WorkerId) {
        self.available.retain(|id| *id != worker_id);
    }

    /// The next pairing, if both a task and a unit are waiting.
    pub fn next_dispatch(&mut self) -> Option<(T, WorkerId)> {
        if self.pending.is_empty() {
            return None;
        }
        let worker_id = self.available.pop_front()?;
        let task = self.pending.pop_front()?;
        Some((task, worker_id))
    }

    pub fn drain_pending(&mut self) -> Vec<T> {
        self.pending.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
