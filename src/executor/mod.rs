//! Task execution infrastructure.
//!
//! Tasks, the handles that observe them, the worker loop and the pool that
//! sizes the set of workers.

pub mod handle;
pub mod panic_handler;
pub(crate) mod pool;
pub mod task;
pub(crate) mod worker;

pub use handle::{TaskHandle, TaskStatus};
pub use panic_handler::{PanicHandler, PanicInfo, PanicStrategy};
pub use task::TaskId;

pub(crate) use task::TaskItem;
