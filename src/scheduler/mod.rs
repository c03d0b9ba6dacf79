//! Priority classes and the shared work queue.

pub mod priority;
pub(crate) mod queue;

pub use priority::{Priority, PriorityLevel, PriorityLevels, TaskType};
