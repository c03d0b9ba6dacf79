use crate::executor::TaskId;
use crate::scheduler::Priority;
use std::fmt;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("submission rejected: executor is shutting down")]
    SubmissionRejected,

    #[error("unknown priority class {0}")]
    UnknownPriority(Priority),

    #[error("unknown priority level name: {0}")]
    UnknownPriorityName(String),

    #[error("task {task} failed: {failure}")]
    PayloadFailure { task: TaskId, failure: Failure },

    #[error("task {0} was cancelled")]
    Cancelled(TaskId),

    #[error("result of task {0} was already taken")]
    ResultTaken(TaskId),

    #[error("wait interrupted")]
    WaitInterrupted,

    #[error("timed out waiting for task result")]
    WaitTimeout,

    #[error("drain timed out with {unresolved} unresolved task(s)")]
    DrainTimeout { unresolved: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    /// The payload failure carried by this error, if any.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Error::PayloadFailure { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Why a payload did not produce a value.
#[derive(Debug, Clone)]
pub enum Failure {
    /// The payload returned an error.
    Error(Arc<dyn std::error::Error + Send + Sync + 'static>),
    /// The payload panicked; holds the panic message.
    Panic(String),
}

impl Failure {
    pub fn is_panic(&self) -> bool {
        matches!(self, Failure::Panic(_))
    }

    /// Downcast the returned error to a concrete type.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Failure::Error(err) => err.downcast_ref::<E>(),
            Failure::Panic(_) => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Error(err) => write!(f, "{}", err),
            Failure::Panic(msg) => write!(f, "panicked: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_failure_display() {
        let err = Failure::Error(Arc::new(DiskFull));
        assert_eq!(err.to_string(), "disk full");
        assert!(err.downcast_ref::<DiskFull>().is_some());

        let panic = Failure::Panic("boom".into());
        assert_eq!(panic.to_string(), "panicked: boom");
        assert!(panic.is_panic());
    }

    #[test]
    fn test_drain_timeout_message() {
        let err = Error::DrainTimeout { unresolved: 3 };
        assert_eq!(err.to_string(), "drain timed out with 3 unresolved task(s)");
        assert!(err.failure().is_none());
    }
}
