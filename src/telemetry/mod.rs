//! Telemetry for the executor.
//!
//! Counters and latency histograms updated by workers and the submission
//! path. Logging goes through `tracing`; this module never installs a
//! subscriber.

pub mod metrics;

pub use metrics::{LatencySummary, Metrics, MetricsSnapshot};
