// worker thread loop
use super::pool::WorkerPool;
use super::task::{Outcome, TaskItem};
use crate::scheduler::queue::Dequeue;
use std::sync::Arc;
use std::time::Instant;

pub type WorkerId = usize;

pub(crate) struct Worker {
    pub id: WorkerId,
    pool: Arc<WorkerPool>,
}

// Gives the worker's slot back to the pool however the loop ends.
struct LiveSlot<'a> {
    pool: &'a WorkerPool,
    held: bool,
}

impl Drop for LiveSlot<'_> {
    fn drop(&mut self) {
        if self.held {
            self.pool.release_slot();
        }
    }
}

impl Worker {
    pub fn new(id: WorkerId, pool: Arc<WorkerPool>) -> Self {
        Self { id, pool }
    }

    // main loop
    pub fn run(self) {
        let mut slot = LiveSlot {
            pool: &self.pool,
            held: true,
        };
        tracing::debug!(worker = self.id, "worker started");

        loop {
            let item = if self.pool.above_core() {
                match self.pool.queue().dequeue_timeout(self.pool.idle_timeout()) {
                    Dequeue::Item(item) => item,
                    Dequeue::Closed => break,
                    Dequeue::TimedOut => {
                        if self.pool.try_retire() {
                            slot.held = false;
                            tracing::debug!(worker = self.id, "idle worker retired");
                            return;
                        }
                        continue;
                    }
                }
            } else {
                match self.pool.queue().dequeue_blocking() {
                    Some(item) => item,
                    None => break,
                }
            };

            self.execute(item);
        }

        tracing::debug!(worker = self.id, "worker stopped, queue closed");
    }

    fn execute(&self, item: TaskItem) {
        let metrics = self.pool.metrics();
        let task = item.id;
        metrics.record_queue_wait(item.enqueued_at.elapsed());

        let start = Instant::now();
        let outcome = item.execute(self.pool.panic_handler());
        let elapsed = start.elapsed();

        match outcome {
            Outcome::Completed => metrics.record_completed(elapsed),
            Outcome::Failed => metrics.record_failed(elapsed),
            Outcome::Panicked => metrics.record_panicked(elapsed),
            Outcome::Skipped => {
                tracing::trace!(worker = self.id, task = %task, "skipped cancelled task");
            }
        }

        self.pool.queue().finish();
    }
}
