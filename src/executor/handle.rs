//! Caller-facing handles and the producer side that resolves them.

use super::task::{Job, Outcome, RunContext, TaskId};
use crate::error::{Error, Failure, Result};
use crate::scheduler::queue::PriorityWorkQueue;
use crate::scheduler::Priority;
use crate::telemetry::Metrics;
use crate::util::interrupt::Interrupts;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Observable state of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

enum State<T> {
    Pending,
    Running,
    Completed(T),
    // Completed, value moved out by `join`.
    Taken,
    Failed(Failure),
    Cancelled,
}

impl<T> State<T> {
    fn status(&self) -> TaskStatus {
        match self {
            State::Pending => TaskStatus::Pending,
            State::Running => TaskStatus::Running,
            State::Completed(_) | State::Taken => TaskStatus::Completed,
            State::Failed(_) => TaskStatus::Failed,
            State::Cancelled => TaskStatus::Cancelled,
        }
    }
}

struct Cell<T> {
    state: State<T>,
    interrupts: Interrupts,
}

/// Result cell shared by a handle and its job.
struct Slot<T> {
    cell: Mutex<Cell<T>>,
    resolved: Condvar,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            cell: Mutex::new(Cell {
                state: State::Pending,
                interrupts: Interrupts::default(),
            }),
            resolved: Condvar::new(),
        }
    }

    /// Pending -> Running. Fails if the task was cancelled first.
    fn try_start(&self) -> bool {
        let mut cell = self.cell.lock();
        match cell.state {
            State::Pending => {
                cell.state = State::Running;
                true
            }
            _ => false,
        }
    }

    /// Pending -> Cancelled.
    fn try_cancel(&self) -> bool {
        let mut cell = self.cell.lock();
        match cell.state {
            State::Pending => {
                cell.state = State::Cancelled;
                drop(cell);
                self.resolved.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Running -> Completed | Failed. Any other source state is rejected.
    fn resolve(&self, task: TaskId, terminal: State<T>) -> bool {
        let mut cell = self.cell.lock();
        if !matches!(cell.state, State::Running) {
            tracing::warn!(
                task = %task,
                current = ?cell.state.status(),
                attempted = ?terminal.status(),
                "rejected second resolution of task"
            );
            return false;
        }
        cell.state = terminal;
        drop(cell);
        self.resolved.notify_all();
        true
    }

    fn wait_terminal(&self, deadline: Option<Instant>) -> Result<MutexGuard<'_, Cell<T>>> {
        let mut cell = self.cell.lock();
        if cell.state.status().is_terminal() {
            return Ok(cell);
        }
        let ticket = cell.interrupts.enter().ok_or(Error::WaitInterrupted)?;

        let result = loop {
            if cell.state.status().is_terminal() {
                break Ok(());
            }
            if cell.interrupts.fired(ticket) {
                break Err(Error::WaitInterrupted);
            }
            match deadline {
                Some(deadline) => {
                    if self.resolved.wait_until(&mut cell, deadline).timed_out()
                        && !cell.state.status().is_terminal()
                    {
                        break Err(Error::WaitTimeout);
                    }
                }
                None => self.resolved.wait(&mut cell),
            }
        };
        cell.interrupts.leave(ticket);
        result.map(|()| cell)
    }

    fn interrupt(&self) {
        let mut cell = self.cell.lock();
        if cell.interrupts.raise() {
            drop(cell);
            self.resolved.notify_all();
        }
    }
}

/// Handle to the eventual outcome of a submitted task.
///
/// Clones share the same result cell. Reading never consumes the value, so
/// repeated `get` calls return the same outcome.
pub struct TaskHandle<T> {
    id: TaskId,
    priority: Priority,
    slot: Arc<Slot<T>>,
    queue: Weak<PriorityWorkQueue>,
}

impl<T> TaskHandle<T> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> TaskStatus {
        self.slot.cell.lock().state.status()
    }

    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    /// Block until the task reaches a terminal state.
    pub fn wait(&self) -> Result<()> {
        self.slot.wait_terminal(None).map(|_| ())
    }

    /// Cancel the task if no worker has started it yet.
    ///
    /// Returns false once execution has begun or the task already finished.
    pub fn cancel(&self) -> bool {
        if !self.slot.try_cancel() {
            return false;
        }
        if let Some(queue) = self.queue.upgrade() {
            queue.remove(self.id);
        }
        true
    }

    /// Wake every thread blocked on this handle with `WaitInterrupted`.
    /// With no thread blocked, the next wait fails instead. The task itself
    /// is not affected.
    pub fn interrupt(&self) {
        self.slot.interrupt();
    }

    /// Block until the task finishes and move its value out.
    ///
    /// Works for any `T`. Once a value has been joined, `get` on other
    /// clones of this handle returns `ResultTaken`.
    pub fn join(self) -> Result<T> {
        let mut cell = self.slot.wait_terminal(None)?;
        match std::mem::replace(&mut cell.state, State::Taken) {
            State::Completed(value) => Ok(value),
            other => {
                cell.state = other;
                Err(self.terminal_error(&cell.state))
            }
        }
    }

    fn terminal_error(&self, state: &State<T>) -> Error {
        match state {
            State::Failed(failure) => Error::PayloadFailure {
                task: self.id,
                failure: failure.clone(),
            },
            State::Cancelled => Error::Cancelled(self.id),
            State::Taken => Error::ResultTaken(self.id),
            State::Pending | State::Running | State::Completed(_) => {
                unreachable!("terminal error read for non-failed state")
            }
        }
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Block until the task finishes and return its value or failure.
    pub fn get(&self) -> Result<T> {
        let cell = self.slot.wait_terminal(None)?;
        self.outcome(&cell.state)
    }

    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        let cell = self.slot.wait_terminal(Some(Instant::now() + timeout))?;
        self.outcome(&cell.state)
    }

    /// Non-blocking read; `None` while the task is pending or running.
    pub fn try_get(&self) -> Option<Result<T>> {
        let cell = self.slot.cell.lock();
        if cell.state.status().is_terminal() {
            Some(self.outcome(&cell.state))
        } else {
            None
        }
    }

    fn outcome(&self, state: &State<T>) -> Result<T> {
        match state {
            State::Completed(value) => Ok(value.clone()),
            State::Pending | State::Running => unreachable!("outcome read before resolution"),
            _ => Err(self.terminal_error(state)),
        }
    }
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            priority: self.priority,
            slot: Arc::clone(&self.slot),
            queue: Weak::clone(&self.queue),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("status", &self.status())
            .finish()
    }
}

/// Producer side of a handle: owns the payload until a worker runs it.
pub(crate) struct HandleJob<T, F> {
    slot: Arc<Slot<T>>,
    payload: Option<F>,
    metrics: Arc<Metrics>,
}

/// Create a connected job/handle pair for a payload.
pub(crate) fn pair<T, F>(
    id: TaskId,
    priority: Priority,
    payload: F,
    queue: &Arc<PriorityWorkQueue>,
    metrics: Arc<Metrics>,
) -> (HandleJob<T, F>, TaskHandle<T>)
where
    F: FnOnce() -> std::result::Result<T, Failure>,
{
    let slot = Arc::new(Slot::new());
    let job = HandleJob {
        slot: Arc::clone(&slot),
        payload: Some(payload),
        metrics,
    };
    let handle = TaskHandle {
        id,
        priority,
        slot,
        queue: Arc::downgrade(queue),
    };
    (job, handle)
}

impl<T, F> Job for HandleJob<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, Failure> + Send + 'static,
{
    fn run(mut self: Box<Self>, ctx: RunContext<'_>) -> Outcome {
        let Some(payload) = self.payload.take() else {
            return Outcome::Skipped;
        };

        if !self.slot.try_start() {
            self.metrics.record_cancelled();
            return Outcome::Skipped;
        }

        let (terminal, outcome) = match ctx.panic_handler.execute(ctx.id, payload) {
            Ok(Ok(value)) => (State::Completed(value), Outcome::Completed),
            Ok(Err(failure)) => {
                tracing::warn!(task = %ctx.id, error = %failure, "task failed");
                (State::Failed(failure), Outcome::Failed)
            }
            Err(panic) => (State::Failed(Failure::Panic(panic.message)), Outcome::Panicked),
        };

        self.slot.resolve(ctx.id, terminal);
        outcome
    }

    fn reject(mut self: Box<Self>) {
        // Never accepted, so not counted as cancelled.
        self.payload = None;
        self.slot.try_cancel();
    }
}

impl<T, F> Drop for HandleJob<T, F> {
    fn drop(&mut self) {
        // Never handed to a worker: the handle must still reach a terminal state.
        if self.payload.take().is_some() {
            self.slot.try_cancel();
            self.metrics.record_cancelled();
        }
    }
}
