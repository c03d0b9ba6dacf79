use super::panic_handler::PanicHandler;
use super::worker::{Worker, WorkerId};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scheduler::queue::PriorityWorkQueue;
use crate::telemetry::Metrics;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Dynamically sized set of worker threads draining one queue.
///
/// Grows one worker per enqueue while there is a backlog and fewer than
/// `max_size` workers are alive. Workers beyond `core_size` retire after
/// `idle_timeout` without work.
pub(crate) struct WorkerPool {
    queue: Arc<PriorityWorkQueue>,
    metrics: Arc<Metrics>,
    panic_handler: PanicHandler,
    core_size: usize,
    max_size: usize,
    idle_timeout: Duration,
    stack_size: Option<usize>,
    thread_name_prefix: String,
    live: AtomicUsize,
    next_id: AtomicUsize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: &Config, queue: Arc<PriorityWorkQueue>, metrics: Arc<Metrics>) -> Self {
        Self {
            queue,
            metrics,
            panic_handler: PanicHandler::new(config.panic_strategy),
            core_size: config.core_size,
            max_size: config.max_size,
            idle_timeout: config.idle_timeout,
            stack_size: config.stack_size,
            thread_name_prefix: config.thread_name_prefix.clone(),
            live: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn queue(&self) -> &PriorityWorkQueue {
        &self.queue
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn panic_handler(&self) -> &PanicHandler {
        &self.panic_handler
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn above_core(&self) -> bool {
        self.live.load(Ordering::SeqCst) > self.core_size
    }

    /// Called after every successful enqueue.
    pub fn on_enqueue(self: &Arc<Self>) -> Result<()> {
        let live = self.live.load(Ordering::SeqCst);
        if (live < self.core_size || self.queue.backlog() > 0) && self.try_reserve_slot() {
            self.spawn_reserved()?;
        }
        Ok(())
    }

    /// Start workers until `core_size` are alive. Returns how many started.
    pub fn prestart_core_workers(self: &Arc<Self>) -> Result<usize> {
        let mut started = 0;
        while self.live.load(Ordering::SeqCst) < self.core_size && self.try_reserve_slot() {
            self.spawn_reserved()?;
            started += 1;
        }
        Ok(started)
    }

    fn try_reserve_slot(&self) -> bool {
        let mut live = self.live.load(Ordering::SeqCst);
        loop {
            if live >= self.max_size {
                return false;
            }
            match self
                .live
                .compare_exchange(live, live + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }

    pub(crate) fn release_slot(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.metrics.record_worker_retired();
    }

    /// Give up this worker's slot if the pool is above `core_size`.
    ///
    /// If work was enqueued while retiring, the worker rejoins when a slot
    /// is still free; otherwise a newly spawned worker already took it.
    pub(crate) fn try_retire(&self) -> bool {
        let mut live = self.live.load(Ordering::SeqCst);
        loop {
            if live <= self.core_size {
                return false;
            }
            match self
                .live
                .compare_exchange(live, live - 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(actual) => live = actual,
            }
        }

        if self.queue.backlog() > 0 && self.try_reserve_slot() {
            return false;
        }
        self.metrics.record_worker_retired();
        true
    }

    fn spawn_reserved(self: &Arc<Self>) -> Result<()> {
        let id: WorkerId = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", self.thread_name_prefix, id);

        let mut builder = thread::Builder::new().name(name);
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let worker = Worker::new(id, Arc::clone(self));
        match builder.spawn(move || worker.run()) {
            Ok(handle) => {
                self.metrics.record_worker_spawned();
                let mut threads = self.threads.lock();
                threads.retain(|t| !t.is_finished());
                threads.push(handle);
                tracing::debug!(worker = id, live = self.live_workers(), "spawned worker");
                Ok(())
            }
            Err(e) => {
                self.live.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!(worker = id, error = %e, "failed to spawn worker");
                Err(Error::executor(format!("spawn failed: {}", e)))
            }
        }
    }

    /// Join every worker. The queue must be closed first or this blocks
    /// until it is.
    pub fn join_all(&self) {
        let current = thread::current().id();
        let threads = std::mem::take(&mut *self.threads.lock());
        for thread in threads {
            // A task that drops the last executor reference runs on a worker.
            if thread.thread().id() == current {
                continue;
            }
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::task::tests::sleeping_item;
    use std::time::Instant;

    fn pool(core: usize, max: usize, idle_ms: u64) -> Arc<WorkerPool> {
        let config = Config::builder()
            .core_size(core)
            .max_size(max)
            .idle_timeout(Duration::from_millis(idle_ms))
            .build()
            .unwrap();
        Arc::new(WorkerPool::new(
            &config,
            Arc::new(PriorityWorkQueue::new()),
            Arc::new(Metrics::new()),
        ))
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_prestart_core() {
        let pool = pool(2, 4, 50);
        assert_eq!(pool.prestart_core_workers().unwrap(), 2);
        assert_eq!(pool.live_workers(), 2);
        assert_eq!(pool.prestart_core_workers().unwrap(), 0);

        pool.queue().close();
        pool.join_all();
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_never_exceeds_max() {
        let pool = pool(0, 2, 1_000);
        for i in 0..10 {
            pool.queue().enqueue(sleeping_item(1, i, 20)).unwrap();
            pool.on_enqueue().unwrap();
            assert!(pool.live_workers() <= 2);
        }
        assert_eq!(pool.live_workers(), 2);
        assert!(wait_for(|| pool.queue().unresolved() == 0));

        pool.queue().close();
        pool.join_all();
    }

    #[test]
    fn test_idle_workers_above_core_retire() {
        let pool = pool(1, 3, 30);
        for i in 0..3 {
            pool.queue().enqueue(sleeping_item(1, i, 50)).unwrap();
            pool.on_enqueue().unwrap();
        }
        assert_eq!(pool.live_workers(), 3);

        assert!(wait_for(|| pool.queue().unresolved() == 0));
        assert!(wait_for(|| pool.live_workers() == 1));
        assert!(pool.metrics().snapshot().workers_retired >= 1);

        pool.queue().close();
        pool.join_all();
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_try_retire_respects_core() {
        let pool = pool(1, 2, 30);
        assert!(pool.try_reserve_slot());
        assert!(!pool.try_retire());
        assert!(pool.try_reserve_slot());
        assert!(pool.try_retire());
        assert_eq!(pool.live_workers(), 1);
        pool.release_slot();
    }
}
