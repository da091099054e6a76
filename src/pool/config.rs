//! Thread pool sizing and naming.
//!
//! Settings come from, highest priority first: explicit setters, then
//! `BLOCKSYNC_POOL_*` environment variables applied by
//! [`PoolConfig::apply_env_overrides`], then [`PoolConfig::default`].
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `BLOCKSYNC_POOL_THREADS` | `usize` | `threads` |
//! | `BLOCKSYNC_POOL_QUEUE_CAPACITY` | `usize` | `queue_capacity` |
//! | `BLOCKSYNC_POOL_STACK_SIZE` | `usize` | `stack_size` |
//! | `BLOCKSYNC_POOL_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |

use crate::{log, Error, Result, ThreadAttr};
use std::{num::NonZeroUsize, thread};

pub const ENV_THREADS: &str = "BLOCKSYNC_POOL_THREADS";
pub const ENV_QUEUE_CAPACITY: &str = "BLOCKSYNC_POOL_QUEUE_CAPACITY";
pub const ENV_STACK_SIZE: &str = "BLOCKSYNC_POOL_STACK_SIZE";
pub const ENV_THREAD_NAME_PREFIX: &str = "BLOCKSYNC_POOL_THREAD_NAME_PREFIX";

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_THREAD_NAME_PREFIX: &str = "blocksync-worker";

/// How a [`ThreadPool`](crate::ThreadPool) is built.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of worker threads, fixed for the pool's lifetime.
    pub threads: usize,
    /// Maximum number of queued, not yet started tasks.
    pub queue_capacity: usize,
    /// Workers are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
    /// Worker stack size in bytes, or the platform default.
    pub stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_owned(),
            stack_size: None,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// The defaults with any `BLOCKSYNC_POOL_*` variables applied on top.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidArgument("pool needs at least one thread"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidArgument("queue capacity must be positive"));
        }
        if self.stack_size == Some(0) {
            return Err(Error::InvalidArgument("thread stack size must be positive"));
        }
        if self.thread_name_prefix.contains('\0') {
            return Err(Error::InvalidArgument("thread name contains a nul byte"));
        }
        Ok(())
    }

    /// Overwrites fields whose environment variable is set.
    ///
    /// A variable that is set but does not parse is reported as
    /// [`Error::InvalidArgument`] and leaves the remaining fields untouched.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(val) = read_env(ENV_THREADS) {
            self.threads = parse_usize(ENV_THREADS, &val)?;
        }
        if let Some(val) = read_env(ENV_QUEUE_CAPACITY) {
            self.queue_capacity = parse_usize(ENV_QUEUE_CAPACITY, &val)?;
        }
        if let Some(val) = read_env(ENV_STACK_SIZE) {
            self.stack_size = Some(parse_usize(ENV_STACK_SIZE, &val)?);
        }
        if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
            self.thread_name_prefix = val;
        }
        Ok(())
    }

    pub(super) fn worker_attr(&self, index: usize) -> ThreadAttr {
        let attr = ThreadAttr::new().name(format!("{}-{}", self.thread_name_prefix, index));
        match self.stack_size {
            Some(size) => attr.stack_size(size),
            None => attr,
        }
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var_name: &'static str, val: &str) -> Result<usize> {
    val.trim().parse::<usize>().map_err(|e| {
        log::warn!(var = var_name, value = val, error = %e, "rejecting unparsable pool setting");
        Error::InvalidArgument(var_name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PoolConfig::default();
        assert!(config.threads >= 1);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.thread_name_prefix, DEFAULT_THREAD_NAME_PREFIX);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zeroes() {
        assert!(PoolConfig::new().threads(0).validate().is_err());
        assert!(PoolConfig::new().queue_capacity(0).validate().is_err());
        assert!(PoolConfig::new().stack_size(0).validate().is_err());
        assert!(PoolConfig::new()
            .thread_name_prefix("a\0b")
            .validate()
            .is_err());
    }

    #[test]
    fn worker_names() {
        let config = PoolConfig::new()
            .thread_name_prefix("io")
            .stack_size(128 * 1024);
        let attr = config.worker_attr(3);
        assert_eq!(attr.get_name(), Some("io-3"));
        assert_eq!(attr.get_stack_size(), Some(128 * 1024));
    }

    // The only test in the crate touching these variables.
    #[test]
    fn env_overrides() {
        std::env::set_var(ENV_THREADS, " 3 ");
        std::env::set_var(ENV_QUEUE_CAPACITY, "17");
        std::env::set_var(ENV_THREAD_NAME_PREFIX, "env");
        std::env::remove_var(ENV_STACK_SIZE);

        let config = PoolConfig::from_env().unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.queue_capacity, 17);
        assert_eq!(config.thread_name_prefix, "env");
        assert_eq!(config.stack_size, None);

        std::env::set_var(ENV_QUEUE_CAPACITY, "lots");
        assert!(matches!(
            PoolConfig::from_env(),
            Err(Error::InvalidArgument(ENV_QUEUE_CAPACITY))
        ));

        for var in [ENV_THREADS, ENV_QUEUE_CAPACITY, ENV_THREAD_NAME_PREFIX] {
            std::env::remove_var(var);
        }
    }
}
