use crate::config::{Config, ShutdownPolicy};
use crate::error::{Error, Failure, Result};
use crate::executor::handle::{self, TaskHandle};
use crate::executor::pool::WorkerPool;
use crate::executor::{TaskId, TaskItem};
use crate::scheduler::queue::PriorityWorkQueue;
use crate::scheduler::{Priority, PriorityLevels};
use crate::telemetry::{Metrics, MetricsSnapshot};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const TERMINATED: u8 = 2;

// Sentinel for "nothing submitted yet"; every real weight fits in a u32.
const NO_PEAK: u64 = u64::MAX;

/// Outcome of a completed shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks still queued or running when the call returned. Always zero on
    /// success; a drain that times out is reported as `Error::DrainTimeout`.
    pub unresolved: usize,
    /// Queued tasks cancelled by a non-graceful shutdown.
    pub cancelled: usize,
    pub elapsed: Duration,
}

/// Priority-aware task executor.
///
/// Submissions return a [`TaskHandle`] immediately; a pool of worker threads
/// runs queued work most-urgent-first, FIFO within a priority class.
///
/// ```
/// use prio_pool::{Executor, TaskType};
///
/// let executor = Executor::with_defaults().unwrap();
/// let handle = executor
///     .submit_with_priority(|| 6 * 7, TaskType::Computational)
///     .unwrap();
/// assert_eq!(handle.get().unwrap(), 42);
///
/// let report = executor
///     .graceful_shutdown(std::time::Duration::from_secs(5))
///     .unwrap();
/// assert_eq!(report.unresolved, 0);
/// ```
pub struct Executor {
    queue: Arc<PriorityWorkQueue>,
    pool: Arc<WorkerPool>,
    metrics: Arc<Metrics>,
    levels: PriorityLevels,
    shutdown_policy: ShutdownPolicy,
    next_seq: AtomicU64,
    peak_urgency: AtomicU64,
    state: AtomicU8,
}

impl Executor {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(PriorityWorkQueue::new());
        let metrics = Arc::new(Metrics::new());
        let pool = Arc::new(WorkerPool::new(&config, queue.clone(), metrics.clone()));

        if config.prestart_core {
            if let Err(e) = pool.prestart_core_workers() {
                // Release the workers that did start.
                queue.close();
                pool.join_all();
                return Err(e);
            }
        }

        tracing::debug!(
            core_size = config.core_size,
            max_size = config.max_size,
            idle_timeout = ?config.idle_timeout,
            "executor started"
        );

        Ok(Self {
            queue,
            pool,
            metrics,
            levels: config.priority_levels,
            shutdown_policy: config.shutdown_policy,
            next_seq: AtomicU64::new(0),
            peak_urgency: AtomicU64::new(NO_PEAK),
            state: AtomicU8::new(RUNNING),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Config::default())
    }

    /// Submit work at the least urgent configured class.
    pub fn submit<T, F>(&self, f: F) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit_with_priority(f, self.levels.lowest_urgency())
    }

    pub fn submit_with_priority<T, F, P>(&self, f: F, priority: P) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        P: Into<Priority>,
    {
        self.enqueue(move || Ok(f()), priority.into())
    }

    /// Submit work that may fail; an `Err` resolves the handle as failed.
    pub fn submit_fallible<T, E, F, P>(&self, f: F, priority: P) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        P: Into<Priority>,
    {
        self.enqueue(
            move || f().map_err(|e| Failure::Error(Arc::new(e))),
            priority.into(),
        )
    }

    /// Submit at the class registered under `level` in the priority table.
    pub fn submit_named<T, F>(&self, f: F, level: &str) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let priority = self
            .levels
            .by_name(level)
            .ok_or_else(|| Error::UnknownPriorityName(level.to_string()))?;
        self.submit_with_priority(f, priority)
    }

    fn enqueue<T, F>(&self, payload: F, priority: Priority) -> Result<TaskHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> std::result::Result<T, Failure> + Send + 'static,
    {
        if !self.levels.contains(priority) {
            return Err(Error::UnknownPriority(priority));
        }
        if self.rejects_submissions() {
            self.metrics.record_rejected();
            return Err(Error::SubmissionRejected);
        }

        let id = TaskId::next();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (job, handle) = handle::pair(id, priority, payload, &self.queue, self.metrics.clone());
        let item = TaskItem::new(id, priority, seq, Box::new(job));

        if let Err(item) = self.queue.enqueue(item) {
            item.reject();
            self.metrics.record_rejected();
            return Err(Error::SubmissionRejected);
        }
        self.metrics.record_submitted();
        self.peak_urgency
            .fetch_min(u64::from(priority.weight()), Ordering::Relaxed);

        if let Err(e) = self.pool.on_enqueue() {
            // Other workers will pick the item up; only fail with none alive.
            if self.pool.live_workers() == 0 {
                handle.cancel();
                return Err(e);
            }
        }

        tracing::trace!(task = %id, priority = %priority, "task submitted");
        Ok(handle)
    }

    fn rejects_submissions(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            RUNNING => false,
            DRAINING => self.shutdown_policy == ShutdownPolicy::RejectNew,
            _ => true,
        }
    }

    /// Stop intake and wait for queued and running work to finish.
    pub fn graceful_shutdown(&self, timeout: Duration) -> Result<DrainReport> {
        self.shutdown(true, timeout)
    }

    /// Shut the executor down.
    ///
    /// Graceful shutdown waits for the queue to empty and every running
    /// task to resolve. Otherwise queued tasks are cancelled and only
    /// running tasks are awaited. Running tasks are never interrupted.
    ///
    /// Returns `DrainTimeout` with the unresolved count if `timeout` elapses
    /// first; workers keep draining and the call may be repeated. Returns
    /// `WaitInterrupted` if [`interrupt_shutdown`](Self::interrupt_shutdown)
    /// is called meanwhile.
    pub fn shutdown(&self, graceful: bool, timeout: Duration) -> Result<DrainReport> {
        let start = Instant::now();
        let _ = self
            .state
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire);

        if !graceful || self.shutdown_policy == ShutdownPolicy::RejectNew {
            self.queue.close();
        }

        let cancelled = if graceful {
            0
        } else {
            // Dropping an unrun item cancels its handle.
            self.queue.drain_pending().len()
        };

        tracing::debug!(
            graceful,
            cancelled,
            unresolved = self.queue.unresolved(),
            ?timeout,
            "shutting down executor"
        );

        if let Err(e) = self.queue.wait_drained(start.checked_add(timeout)) {
            tracing::warn!(error = %e, "executor shutdown did not complete");
            return Err(e);
        }

        self.queue.close();
        self.state.store(TERMINATED, Ordering::Release);
        self.pool.join_all();

        let report = DrainReport {
            unresolved: 0,
            cancelled,
            elapsed: start.elapsed(),
        };
        tracing::debug!(?report, "executor terminated");
        Ok(report)
    }

    /// Wake a thread blocked in [`shutdown`](Self::shutdown) with
    /// `WaitInterrupted`.
    pub fn interrupt_shutdown(&self) {
        self.queue.interrupt_drain_waiters();
    }

    /// Tasks queued and not yet dispatched.
    pub fn queue_depth(&self) -> usize {
        self.queue.size()
    }

    /// Class of the task that will be dispatched next, `None` when nothing
    /// is queued.
    pub fn next_priority(&self) -> Option<Priority> {
        self.queue.peek_priority()
    }

    /// Most urgent class ever submitted, `None` before the first submission.
    pub fn peak_urgency_seen(&self) -> Option<Priority> {
        match self.peak_urgency.load(Ordering::Relaxed) {
            NO_PEAK => None,
            weight => Some(Priority::new(weight as u32)),
        }
    }

    pub fn live_workers(&self) -> usize {
        self.pool.live_workers()
    }

    /// Tasks currently executing.
    pub fn in_flight(&self) -> usize {
        self.queue.in_flight()
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.load(Ordering::Acquire) != RUNNING
    }

    pub fn is_terminated(&self) -> bool {
        self.state.load(Ordering::Acquire) == TERMINATED
    }

    pub fn priority_levels(&self) -> &PriorityLevels {
        &self.levels
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("queue_depth", &self.queue_depth())
            .field("next_priority", &self.next_priority())
            .field("in_flight", &self.in_flight())
            .field("live_workers", &self.live_workers())
            .field("shutdown", &self.is_shutdown())
            .field("accepting", &!self.queue.is_closed())
            .finish()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if self.is_terminated() {
            return;
        }
        // Workers finish whatever is queued, then see the closed queue.
        self.state.store(TERMINATED, Ordering::Release);
        self.queue.close();
        self.pool.join_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::TaskType;

    fn single_worker() -> Executor {
        Executor::new(Config::builder().pool_size(1).build().unwrap()).unwrap()
    }

    #[test]
    fn test_submit_and_get() {
        let executor = single_worker();
        let handle = executor.submit(|| "hello".to_string()).unwrap();
        assert_eq!(handle.get().unwrap(), "hello");
        assert_eq!(handle.priority(), TaskType::Other.priority());
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let executor = single_worker();
        let err = executor.submit_with_priority(|| 1, Priority::new(99)).unwrap_err();
        assert!(matches!(err, Error::UnknownPriority(p) if p.weight() == 99));

        let err = executor.submit_named(|| 1, "urgent").unwrap_err();
        assert!(matches!(err, Error::UnknownPriorityName(_)));

        let handle = executor.submit_named(|| 1, "io").unwrap();
        assert_eq!(handle.priority(), TaskType::Io.priority());
    }

    #[test]
    fn test_peak_urgency_tracks_most_urgent() {
        let executor = single_worker();
        assert_eq!(executor.peak_urgency_seen(), None);

        executor.submit_with_priority(|| (), TaskType::Io).unwrap();
        assert_eq!(executor.peak_urgency_seen(), Some(TaskType::Io.priority()));

        executor.submit_with_priority(|| (), TaskType::Other).unwrap();
        assert_eq!(executor.peak_urgency_seen(), Some(TaskType::Io.priority()));

        executor
            .submit_with_priority(|| (), TaskType::Computational)
            .unwrap();
        assert_eq!(
            executor.peak_urgency_seen(),
            Some(TaskType::Computational.priority())
        );
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let executor = single_worker();
        executor.graceful_shutdown(Duration::from_secs(5)).unwrap();

        assert!(executor.is_terminated());
        assert!(matches!(
            executor.submit(|| 1),
            Err(Error::SubmissionRejected)
        ));
        assert_eq!(executor.metrics().tasks_rejected, 1);
        assert_eq!(executor.live_workers(), 0);
    }

    #[test]
    fn test_refused_submission_counts_only_as_rejected() {
        let executor = Executor::new(
            Config::builder()
                .pool_size(1)
                .shutdown_policy(ShutdownPolicy::AcceptUntilDrained)
                .build()
                .unwrap(),
        )
        .unwrap();
        // Queue closed by a forced shutdown while intake is still open.
        executor.state.store(DRAINING, Ordering::Release);
        executor.queue.close();

        assert!(matches!(
            executor.submit(|| 1),
            Err(Error::SubmissionRejected)
        ));
        let metrics = executor.metrics();
        assert_eq!(metrics.tasks_submitted, 0);
        assert_eq!(metrics.tasks_rejected, 1);
        assert_eq!(metrics.tasks_cancelled, 0);
        assert_eq!(metrics.tasks_resolved(), 0);
    }

    #[test]
    fn test_next_priority_reports_queue_head() {
        let executor = single_worker();
        assert_eq!(executor.next_priority(), None);

        let gate = Arc::new((parking_lot::Mutex::new(false), parking_lot::Condvar::new()));
        let blocker = {
            let gate = gate.clone();
            executor
                .submit(move || {
                    let (open, cvar) = &*gate;
                    let mut open = open.lock();
                    while !*open {
                        cvar.wait(&mut open);
                    }
                })
                .unwrap()
        };
        while blocker.status() != crate::TaskStatus::Running {
            std::thread::yield_now();
        }

        executor.submit_with_priority(|| (), TaskType::Other).unwrap();
        executor.submit_with_priority(|| (), TaskType::Io).unwrap();
        assert_eq!(executor.next_priority(), Some(TaskType::Io.priority()));

        let (open, cvar) = &*gate;
        *open.lock() = true;
        cvar.notify_all();
        executor.graceful_shutdown(Duration::from_secs(5)).unwrap();
        assert_eq!(executor.next_priority(), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_prestart_reports_spawn_error() {
        let config = Config::builder()
            .pool_size(2)
            .prestart_core(true)
            .stack_size(1 << 60)
            .build()
            .unwrap();
        assert!(matches!(Executor::new(config), Err(Error::Executor(_))));
    }

    #[test]
    fn test_fallible_submission() {
        #[derive(Debug, thiserror::Error)]
        #[error("bad input {0}")]
        struct BadInput(i32);

        let executor = single_worker();
        let ok = executor
            .submit_fallible(|| Ok::<_, BadInput>(5), TaskType::Io)
            .unwrap();
        let bad = executor
            .submit_fallible(|| Err::<i32, _>(BadInput(-1)), TaskType::Io)
            .unwrap();

        assert_eq!(ok.get().unwrap(), 5);
        let err = bad.get().unwrap_err();
        assert_eq!(err.failure().unwrap().downcast_ref::<BadInput>().unwrap().0, -1);
    }
}
