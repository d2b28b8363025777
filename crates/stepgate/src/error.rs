//! Error types for task drivers

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Result type returned by task bodies, checkpoints and token resolvers
pub type TaskResult<T = ()> = Result<T, TaskError>;

/// Errors observed by a task body or delivered to its completion handler
///
/// Token errors reach the body either at the resolver call site (when the
/// token is resolved on the stepping thread) or at the next checkpoint. An
/// error the body does not recover from ends the task and is handed to the
/// completion handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TaskError {
    /// Failure reported by a collaborator or raised by the body
    #[error("{0}")]
    Message(String),

    /// IO failure, with the path it concerned when known
    #[error("{}: {source}", display_path(.path))]
    Io {
        /// Path the operation was working on
        path: Option<PathBuf>,
        /// Underlying IO error
        source: Arc<io::Error>,
    },

    /// The body panicked while being stepped
    #[error("task body panicked: {0}")]
    Panicked(String),

    /// A token was dropped without being resolved
    #[error("token {} was dropped without being resolved", display_label(.label))]
    Abandoned {
        /// Label of the dropped token
        label: Option<String>,
    },

    /// The driver was used in a way its contract forbids
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

/// Misuse of a driver that would otherwise corrupt or stall it
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// A token was created while no step of its driver was running on the
    /// calling thread
    #[error("token created outside of a step")]
    TokenOutsideStep,

    /// The body suspended on something other than a checkpoint
    #[error("task body suspended without reaching a checkpoint")]
    ForeignSuspend,
}

impl TaskError {
    /// Build a plain failure from a message
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::Message(message.into())
    }

    /// Build an IO failure tied to a path
    pub fn io_at(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TaskError::Io {
            path: Some(path.into()),
            source: Arc::new(source),
        }
    }

    /// Whether the error was caused by a contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, TaskError::Contract(_))
    }
}

impl From<io::Error> for TaskError {
    fn from(source: io::Error) -> Self {
        TaskError::Io {
            path: None,
            source: Arc::new(source),
        }
    }
}

impl From<String> for TaskError {
    fn from(s: String) -> Self {
        TaskError::Message(s)
    }
}

impl From<&str> for TaskError {
    fn from(s: &str) -> Self {
        TaskError::Message(s.to_string())
    }
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => p.display().to_string(),
        None => "io error".to_string(),
    }
}

fn display_label(label: &Option<String>) -> String {
    match label {
        Some(l) => format!("'{}'", l),
        None => "(unlabeled)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_mentions_path() {
        let err = TaskError::io_at(
            "not_found1",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        let text = err.to_string();
        assert!(text.contains("not_found1"));
        assert!(text.contains("no such file"));
    }

    #[test]
    fn test_abandoned_display() {
        let labeled = TaskError::Abandoned {
            label: Some("d1".to_string()),
        };
        assert_eq!(
            labeled.to_string(),
            "token 'd1' was dropped without being resolved"
        );

        let bare = TaskError::Abandoned { label: None };
        assert!(bare.to_string().contains("(unlabeled)"));
    }

    #[test]
    fn test_contract_conversion() {
        let err: TaskError = ContractViolation::TokenOutsideStep.into();
        assert!(err.is_contract_violation());
        assert_eq!(err.to_string(), "token created outside of a step");
    }

    #[test]
    fn test_from_str() {
        let err: TaskError = "error1".into();
        assert!(matches!(err, TaskError::Message(ref m) if m == "error1"));
    }
}
