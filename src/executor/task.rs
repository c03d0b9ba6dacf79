//! Task representation and ordering.

use super::panic_handler::PanicHandler;
use crate::scheduler::Priority;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a worker knows about the item it is running.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunContext<'a> {
    pub id: TaskId,
    pub panic_handler: &'a PanicHandler,
}

/// Type-erased producer side of a task: runs the payload and resolves the
/// matching handle. Dropping a job that never ran cancels its handle.
pub(crate) trait Job: Send {
    fn run(self: Box<Self>, ctx: RunContext<'_>) -> Outcome;

    /// Discard a job the queue refused. Nothing was accepted, so nothing
    /// is counted.
    fn reject(self: Box<Self>) {}
}

/// How a job ended, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Failed,
    Panicked,
    /// The handle was cancelled before the worker could claim it.
    Skipped,
}

/// Unit of schedulable work.
///
/// Ordered by `(priority, seq)`: the more urgent class first, then the
/// earlier submission. `Ord` is reversed so that `BinaryHeap`, a max-heap,
/// pops the most urgent item.
pub(crate) struct TaskItem {
    pub(crate) id: TaskId,
    pub(crate) priority: Priority,
    pub(crate) seq: u64,
    pub(crate) enqueued_at: Instant,
    pub(crate) job: Box<dyn Job>,
}

impl TaskItem {
    pub fn new(id: TaskId, priority: Priority, seq: u64, job: Box<dyn Job>) -> Self {
        TaskItem {
            id,
            priority,
            seq,
            enqueued_at: Instant::now(),
            job,
        }
    }

    /// Execute the task
    pub fn execute(self, panic_handler: &PanicHandler) -> Outcome {
        let ctx = RunContext {
            id: self.id,
            panic_handler,
        };
        self.job.run(ctx)
    }

    /// Drop an item that was never queued.
    pub fn reject(self) {
        self.job.reject();
    }

    fn urgency_key(&self) -> (Priority, u64) {
        (self.priority, self.seq)
    }
}

impl PartialEq for TaskItem {
    fn eq(&self, other: &Self) -> bool {
        self.urgency_key() == other.urgency_key()
    }
}

impl Eq for TaskItem {}

impl PartialOrd for TaskItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskItem {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.urgency_key().cmp(&self.urgency_key())
    }
}

impl fmt::Debug for TaskItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}
