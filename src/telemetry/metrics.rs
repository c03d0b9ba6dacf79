//! Metrics collection for executor monitoring.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// One hour in nanoseconds, three significant figures.
const HISTOGRAM_MAX_NS: u64 = 3_600_000_000_000;
const HISTOGRAM_SIGFIG: u8 = 3;

/// Executor metrics collector
#[derive(Debug)]
pub struct Metrics {
    // Task counters
    tasks_submitted: AtomicU64,
    tasks_rejected: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_panicked: AtomicU64,
    tasks_cancelled: AtomicU64,

    // Pool counters
    workers_spawned: AtomicU64,
    workers_retired: AtomicU64,

    // Time spent queued and executing
    queue_wait: RwLock<Option<Histogram<u64>>>,
    execution: RwLock<Option<Histogram<u64>>>,

    start_time: Instant,
}

fn new_histogram() -> Option<Histogram<u64>> {
    Histogram::new_with_max(HISTOGRAM_MAX_NS, HISTOGRAM_SIGFIG).ok()
}

fn record(histogram: &RwLock<Option<Histogram<u64>>>, duration: Duration) {
    let ns = (duration.as_nanos() as u64).clamp(1, HISTOGRAM_MAX_NS);
    if let Some(hist) = histogram.write().as_mut() {
        let _ = hist.record(ns);
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicU64::new(0),
            tasks_rejected: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_panicked: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            workers_spawned: AtomicU64::new(0),
            workers_retired: AtomicU64::new(0),
            queue_wait: RwLock::new(new_histogram()),
            execution: RwLock::new(new_histogram()),
            start_time: Instant::now(),
        }
    }

    pub fn record_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self, execution: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        record(&self.execution, execution);
    }

    pub fn record_failed(&self, execution: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        record(&self.execution, execution);
    }

    pub fn record_panicked(&self, execution: Duration) {
        self.tasks_panicked.fetch_add(1, Ordering::Relaxed);
        record(&self.execution, execution);
    }

    pub fn record_queue_wait(&self, wait: Duration) {
        record(&self.queue_wait, wait);
    }

    pub fn record_worker_spawned(&self) {
        self.workers_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_retired(&self) {
        self.workers_retired.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let queue_wait = self.queue_wait.read();
        let execution = self.execution.read();

        MetricsSnapshot {
            timestamp: Instant::now(),
            uptime: self.start_time.elapsed(),
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            workers_retired: self.workers_retired.load(Ordering::Relaxed),
            queue_wait: LatencySummary::from_histogram(queue_wait.as_ref()),
            execution: LatencySummary::from_histogram(execution.as_ref()),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile summary of one histogram, in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub mean_ns: u64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
}

impl LatencySummary {
    fn from_histogram(histogram: Option<&Histogram<u64>>) -> Self {
        match histogram {
            Some(h) if h.len() > 0 => Self {
                count: h.len(),
                mean_ns: h.mean() as u64,
                p50_ns: h.value_at_quantile(0.50),
                p99_ns: h.value_at_quantile(0.99),
                max_ns: h.max(),
            },
            _ => Self::default(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: Instant,
    pub uptime: Duration,
    pub tasks_submitted: u64,
    pub tasks_rejected: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_panicked: u64,
    pub tasks_cancelled: u64,
    pub workers_spawned: u64,
    pub workers_retired: u64,
    pub queue_wait: LatencySummary,
    pub execution: LatencySummary,
}

impl MetricsSnapshot {
    /// Tasks that reached a terminal state.
    pub fn tasks_resolved(&self) -> u64 {
        self.tasks_completed + self.tasks_failed + self.tasks_panicked + self.tasks_cancelled
    }

    /// Calculate tasks per second
    pub fn tasks_per_second(&self) -> f64 {
        let seconds = self.uptime.as_secs_f64();
        if seconds == 0.0 {
            return 0.0;
        }
        (self.tasks_completed + self.tasks_failed + self.tasks_panicked) as f64 / seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_basic() {
        let metrics = Metrics::new();

        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_submitted();
        metrics.record_completed(Duration::from_micros(1));
        metrics.record_failed(Duration::from_micros(2));
        metrics.record_cancelled();
        metrics.record_queue_wait(Duration::from_micros(5));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_submitted, 3);
        assert_eq!(snapshot.tasks_resolved(), 3);
        assert_eq!(snapshot.execution.count, 2);
        assert!(snapshot.execution.mean_ns > 0);
        assert_eq!(snapshot.queue_wait.count, 1);
    }

    #[test]
    fn test_empty_summary() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.execution, LatencySummary::default());
        assert_eq!(snapshot.tasks_resolved(), 0);
    }
}
