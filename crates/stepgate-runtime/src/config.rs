//! Runtime configuration

use crate::error::RuntimeError;
use std::env;

/// Environment variable overriding the IO worker count
pub const IO_THREADS_VAR: &str = "STEPGATE_IO_THREADS";

/// Environment variable overriding the thread name prefix
pub const THREAD_PREFIX_VAR: &str = "STEPGATE_THREAD_PREFIX";

/// Sizing and naming of the runtime's background threads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of IO worker threads
    pub io_workers: usize,

    /// Prefix for thread names (`<prefix>-timer`, `<prefix>-io-<n>`)
    pub thread_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            io_workers: num_cpus::get(),
            thread_prefix: "stepgate".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults, overridden by `STEPGATE_IO_THREADS` and
    /// `STEPGATE_THREAD_PREFIX` when set
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RuntimeError> {
        let mut config = Self::default();

        if let Some(value) = lookup(IO_THREADS_VAR) {
            config.io_workers = match value.trim().parse::<usize>() {
                // 0 = number of CPU cores
                Ok(0) => num_cpus::get(),
                Ok(n) => n,
                Err(_) => {
                    return Err(RuntimeError::InvalidConfig {
                        var: IO_THREADS_VAR,
                        value,
                    })
                }
            };
        }

        if let Some(value) = lookup(THREAD_PREFIX_VAR) {
            if value.trim().is_empty() {
                return Err(RuntimeError::InvalidConfig {
                    var: THREAD_PREFIX_VAR,
                    value,
                });
            }
            config.thread_prefix = value.trim().to_string();
        }

        Ok(config)
    }

    /// Set the IO worker count (0 = number of CPU cores)
    pub fn with_io_workers(mut self, count: usize) -> Self {
        self.io_workers = if count == 0 { num_cpus::get() } else { count };
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_prefix = prefix.into();
        self
    }
}
