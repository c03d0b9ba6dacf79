use crate::error::{Error, Result};
use crate::executor::PanicStrategy;
use crate::scheduler::PriorityLevels;
use std::time::Duration;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(300);
const MAX_WORKERS: usize = 1024;

/// What happens to submissions once shutdown has begun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Reject new work as soon as shutdown starts.
    RejectNew,
    /// Keep accepting work until the queue has drained.
    AcceptUntilDrained,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::RejectNew
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Workers kept alive while idle.
    pub core_size: usize,
    /// Hard cap on concurrent workers.
    pub max_size: usize,
    /// How long a worker above `core_size` may sit idle before retiring.
    pub idle_timeout: Duration,
    pub priority_levels: PriorityLevels,
    pub shutdown_policy: ShutdownPolicy,
    pub panic_strategy: PanicStrategy,
    pub prestart_core: bool,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        let (core_size, max_size) = default_pool_size(num_cpus::get());
        Self {
            core_size,
            max_size,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            priority_levels: PriorityLevels::default(),
            shutdown_policy: ShutdownPolicy::default(),
            panic_strategy: PanicStrategy::default(),
            prestart_core: false,
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "prio-worker".to_string(),
        }
    }
}

/// Core and max pool size for `parallelism` hardware threads.
///
/// Half the cores stay resident and one core is left for the submitter.
/// A single-core host still gets one worker.
pub fn default_pool_size(parallelism: usize) -> (usize, usize) {
    let max_size = parallelism.saturating_sub(1).max(1);
    let core_size = (parallelism / 2).min(max_size);
    (core_size, max_size)
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::config("max_size must be > 0"));
        }
        if self.max_size > MAX_WORKERS {
            return Err(Error::config(format!(
                "max_size too large (max {})",
                MAX_WORKERS
            )));
        }
        if self.core_size > self.max_size {
            return Err(Error::config(format!(
                "core_size {} exceeds max_size {}",
                self.core_size, self.max_size
            )));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::config("idle_timeout must be > 0"));
        }
        if self.priority_levels.is_empty() {
            return Err(Error::config("priority_levels must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn core_size(mut self, n: usize) -> Self {
        self.config.core_size = n;
        self
    }

    pub fn max_size(mut self, n: usize) -> Self {
        self.config.max_size = n;
        self
    }

    /// Fixed-size pool: `core_size == max_size == n`.
    pub fn pool_size(self, n: usize) -> Self {
        self.core_size(n).max_size(n)
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn priority_levels(mut self, levels: PriorityLevels) -> Self {
        self.config.priority_levels = levels;
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.config.shutdown_policy = policy;
        self
    }

    pub fn panic_strategy(mut self, strategy: PanicStrategy) -> Self {
        self.config.panic_strategy = strategy;
        self
    }

    pub fn prestart_core(mut self, prestart: bool) -> Self {
        self.config.prestart_core = prestart;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
