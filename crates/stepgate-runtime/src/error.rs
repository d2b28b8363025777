//! Error types for the runtime collaborators

use std::io;

/// Errors raised while building or configuring the runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A background thread could not be spawned
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        /// Name the thread was given
        name: String,
        /// Underlying OS error
        source: io::Error,
    },

    /// An environment variable held an unusable value
    #[error("invalid value for {var}: {value:?}")]
    InvalidConfig {
        /// Variable name
        var: &'static str,
        /// Value found
        value: String,
    },

    /// The component was already shut down
    #[error("{0} is shut down")]
    ShutDown(&'static str),
}
