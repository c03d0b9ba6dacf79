pub use crate::config::{Config, ConfigBuilder, ShutdownPolicy};
pub use crate::error::{Error, Failure, Result};
pub use crate::executor::{PanicStrategy, TaskHandle, TaskId, TaskStatus};
pub use crate::runtime::{DrainReport, Executor};
pub use crate::scheduler::{Priority, PriorityLevels, TaskType};
pub use crate::telemetry::MetricsSnapshot;
