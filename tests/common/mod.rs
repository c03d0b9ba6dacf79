#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use prio_pool::{Config, Executor, PriorityLevels, TaskHandle, TaskStatus};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Route library logs to the test harness. Set `RUST_LOG=prio_pool=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Single-worker executor whose priority table has `levels` classes with
/// weights `0..levels`, named `p0`, `p1`, ...
pub fn single_worker(levels: u32) -> Executor {
    init_tracing();
    let table = PriorityLevels::new((0..levels).map(|w| (format!("p{}", w), w))).unwrap();
    Executor::new(
        Config::builder()
            .pool_size(1)
            .priority_levels(table)
            .build()
            .unwrap(),
    )
    .unwrap()
}

/// Latch that blocks tasks until the test opens it.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&self) {
        let (open, cvar) = &*self.inner;
        let mut open = open.lock();
        while !*open {
            cvar.wait(&mut open);
        }
    }

    pub fn open(&self) {
        let (open, cvar) = &*self.inner;
        *open.lock() = true;
        cvar.notify_all();
    }
}

/// Poll until `handle` reports `status`, panicking after five seconds.
pub fn wait_for_status<T>(handle: &TaskHandle<T>, status: TaskStatus) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.status() != status {
        assert!(Instant::now() < deadline, "handle never reached {:?}", status);
        thread::sleep(Duration::from_millis(1));
    }
}
