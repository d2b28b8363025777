//! Stepgate Runtime - collaborators that resolve tokens
//!
//! Stepgate tasks never block a thread while waiting; they hand tokens to
//! something that finishes the work elsewhere. This crate provides the two
//! collaborators most bodies need:
//! - **Timer**: one thread firing delayed actions (`timer` module)
//! - **IoPool**: worker threads for blocking file IO (`io` module)
//!
//! [`Runtime`] bundles both, sized by [`RuntimeConfig`].

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod io;
pub mod timer;

pub use config::RuntimeConfig;
pub use error::RuntimeError;
pub use io::IoPool;
pub use timer::Timer;

use once_cell::sync::OnceCell;
use std::sync::Arc;

/// A started timer and IO pool
pub struct Runtime {
    config: RuntimeConfig,
    timer: Arc<Timer>,
    io: IoPool,
}

static GLOBAL: OnceCell<Runtime> = OnceCell::new();

impl Runtime {
    /// Start the runtime's threads
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let timer = Timer::start(format!("{}-timer", config.thread_prefix))?;
        let io = IoPool::start(config.io_workers, &config.thread_prefix)?;
        tracing::debug!(
            io_workers = config.io_workers,
            prefix = %config.thread_prefix,
            "runtime started"
        );
        Ok(Self { config, timer, io })
    }

    /// Start a runtime configured from the environment
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::new(RuntimeConfig::from_env()?)
    }

    /// Process-wide runtime, built from the environment on first use
    pub fn global() -> Result<&'static Runtime, RuntimeError> {
        GLOBAL.get_or_try_init(Self::from_env)
    }

    /// Configuration the runtime was started with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The timer
    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    /// The IO pool
    pub fn io(&self) -> &IoPool {
        &self.io
    }

    /// Stop the timer and drain the IO pool
    pub fn shutdown(&self) {
        self.timer.stop();
        self.io.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
