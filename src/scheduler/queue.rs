//! Blocking priority work queue shared by all workers.

use crate::error::{Error, Result};
use crate::executor::{TaskId, TaskItem};
use crate::scheduler::Priority;
use crate::util::interrupt::Interrupts;
use parking_lot::{Condvar, Mutex};
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

/// Result of a timed dequeue.
#[derive(Debug)]
pub(crate) enum Dequeue {
    Item(TaskItem),
    TimedOut,
    Closed,
}

struct QueueState {
    heap: BinaryHeap<TaskItem>,
    // Items handed to workers whose execution has not finished yet.
    in_flight: usize,
    // Consumers currently parked on `available`.
    waiting: usize,
    closed: bool,
    drain_interrupts: Interrupts,
}

impl QueueState {
    fn is_drained(&self) -> bool {
        self.heap.is_empty() && self.in_flight == 0
    }

    fn take(&mut self) -> Option<TaskItem> {
        let item = self.heap.pop()?;
        self.in_flight += 1;
        Some(item)
    }
}

/// Unbounded heap of pending tasks guarded by a single mutex.
///
/// `available` wakes consumers when work arrives or the queue closes,
/// `drained` wakes shutdown waiters once the heap is empty and nothing is
/// in flight. No other component touches the heap.
pub(crate) struct PriorityWorkQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    drained: Condvar,
}

impl PriorityWorkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                in_flight: 0,
                waiting: 0,
                closed: false,
                drain_interrupts: Interrupts::default(),
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Insert an item, handing it back if the queue no longer accepts work.
    pub fn enqueue(&self, item: TaskItem) -> std::result::Result<(), TaskItem> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(item);
        }
        state.heap.push(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available, or return `None` once the queue is
    /// closed and empty. A returned item counts as in flight until
    /// [`finish`](Self::finish) is called.
    pub fn dequeue_blocking(&self) -> Option<TaskItem> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.take() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state.waiting += 1;
            self.available.wait(&mut state);
            state.waiting -= 1;
        }
    }

    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeue {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.take() {
                return Dequeue::Item(item);
            }
            if state.closed {
                return Dequeue::Closed;
            }
            state.waiting += 1;
            let timed_out = self.available.wait_until(&mut state, deadline).timed_out();
            state.waiting -= 1;
            if timed_out {
                // An item may have landed between the timeout and relocking.
                return match state.take() {
                    Some(item) => Dequeue::Item(item),
                    None if state.closed => Dequeue::Closed,
                    None => Dequeue::TimedOut,
                };
            }
        }
    }

    /// Mark one in-flight execution as finished.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0, "finish without matching dequeue");
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.is_drained() {
            self.drained.notify_all();
        }
    }

    /// Remove a still-queued item. Returns false if it was already dequeued.
    pub fn remove(&self, id: TaskId) -> bool {
        let mut state = self.state.lock();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.heap)
            .into_vec()
            .into_iter()
            .partition(|item| item.id == id);
        state.heap = BinaryHeap::from(kept);
        if !removed.is_empty() && state.is_drained() {
            self.drained.notify_all();
        }
        drop(state);
        // Payloads are dropped outside the lock.
        !removed.is_empty()
    }

    /// Take every queued item out of the heap.
    pub fn drain_pending(&self) -> Vec<TaskItem> {
        let mut state = self.state.lock();
        let items = std::mem::take(&mut state.heap).into_vec();
        if state.is_drained() {
            self.drained.notify_all();
        }
        items
    }

    /// Wait until the heap is empty and nothing is in flight.
    ///
    /// `deadline` of `None` waits indefinitely. Fails with `DrainTimeout`
    /// carrying the unresolved count, or `WaitInterrupted` if
    /// [`interrupt_drain_waiters`](Self::interrupt_drain_waiters) was called
    /// while waiting or since the last wait.
    pub fn wait_drained(&self, deadline: Option<Instant>) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_drained() {
            return Ok(());
        }
        let ticket = state
            .drain_interrupts
            .enter()
            .ok_or(Error::WaitInterrupted)?;

        let result = loop {
            if state.is_drained() {
                break Ok(());
            }
            if state.drain_interrupts.fired(ticket) {
                break Err(Error::WaitInterrupted);
            }
            match deadline {
                Some(deadline) => {
                    if self.drained.wait_until(&mut state, deadline).timed_out()
                        && !state.is_drained()
                    {
                        break Err(Error::DrainTimeout {
                            unresolved: state.heap.len() + state.in_flight,
                        });
                    }
                }
                None => self.drained.wait(&mut state),
            }
        };
        state.drain_interrupts.leave(ticket);
        result
    }

    /// Fail current drain waiters with `WaitInterrupted`, or the next one if
    /// nobody is waiting.
    pub fn interrupt_drain_waiters(&self) {
        let mut state = self.state.lock();
        if state.drain_interrupts.raise() {
            drop(state);
            self.drained.notify_all();
        }
    }

    /// Stop accepting new items. Queued items are still handed out.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn size(&self) -> usize {
        self.state.lock().heap.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.state.lock().heap.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    #[cfg(test)]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    /// Queued items with no parked consumer to take them.
    pub fn backlog(&self) -> usize {
        let state = self.state.lock();
        state.heap.len().saturating_sub(state.waiting)
    }

    /// Items queued plus items executing.
    pub fn unresolved(&self) -> usize {
        let state = self.state.lock();
        state.heap.len() + state.in_flight
    }

    /// Class of the item the next dequeue would return.
    pub fn peek_priority(&self) -> Option<Priority> {
        self.state.lock().heap.peek().map(|item| item.priority)
    }
}

impl Default for PriorityWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
