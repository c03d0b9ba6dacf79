//! prio-pool - priority-aware task execution
//!
//! Callers submit closures tagged with a priority class and get a
//! [`TaskHandle`] back immediately. A bounded, dynamically sized pool of
//! worker threads runs queued work most-urgent-first, FIFO within a class.
//!
//! # Quick Start
//!
//! ```no_run
//! use prio_pool::prelude::*;
//! use std::time::Duration;
//!
//! let executor = Executor::new(
//!     Config::builder()
//!         .core_size(2)
//!         .max_size(4)
//!         .build()
//!         .unwrap(),
//! )
//! .unwrap();
//!
//! let io = executor.submit_with_priority(|| "fetched", TaskType::Io).unwrap();
//! let cpu = executor
//!     .submit_with_priority(|| (1..=10u64).product::<u64>(), TaskType::Computational)
//!     .unwrap();
//!
//! println!("{} {}", io.get().unwrap(), cpu.get().unwrap());
//!
//! executor.graceful_shutdown(Duration::from_secs(1)).unwrap();
//! ```
//!
//! # Features
//!
//! - **Priority Queue**: lower weight dispatches first, ties broken by
//!   submission order
//! - **Elastic Pool**: core workers stay resident, extra workers up to
//!   `max_size` retire after an idle timeout
//! - **Handles**: blocking, timed and non-blocking result reads, cancellation
//!   of not-yet-started tasks
//! - **Graceful Shutdown**: drain or cancel queued work, bounded by a timeout
//! - **Telemetry**: counters and latency histograms; logs via `tracing`

// Lint configuration
#![warn(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod runtime;
pub mod scheduler;
pub mod telemetry;
mod util;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder, ShutdownPolicy};
pub use error::{Error, Failure, Result};
pub use executor::{PanicStrategy, TaskHandle, TaskId, TaskStatus};
pub use runtime::{DrainReport, Executor};
pub use scheduler::{Priority, PriorityLevel, PriorityLevels, TaskType};
