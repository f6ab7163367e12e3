//! Error types for the reconciliation engine
//!
//! Local failures (validation, translation, mapping) always carry the
//! attribute path that caused them. Remote failures carry the lifecycle
//! operation that produced them and pass the collaborator's cause through
//! unchanged.

use std::fmt;
use thiserror::Error;

use crate::resource::Phase;

/// Result alias used throughout the engine
pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle operation that was running when an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
    List,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Import => "import",
            Operation::List => "list",
        };
        f.write_str(name)
    }
}

/// Failure reported by the remote-client collaborator
///
/// The engine only distinguishes "the remote does not know this ID" from
/// everything else.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote object {id} not found")]
    NotFound { id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }
}

/// Main error type for engine operations
#[derive(Debug, Error)]
pub enum Error {
    /// Missing required field or malformed value in a desired document
    #[error("validation error at {path}: {message}")]
    Validation { path: String, message: String },

    /// Desired document could not be converted into a remote payload
    #[error("translation error at {path}: {message}")]
    Translation { path: String, message: String },

    /// Remote record does not fit the schema (remote/schema version mismatch)
    #[error("mapping error at {path}: {message}")]
    Mapping { path: String, message: String },

    /// Remote-client failure, wrapped with the phase that produced it
    #[error("{kind} {operation} failed: {source}")]
    Remote {
        kind: String,
        operation: Operation,
        #[source]
        source: RemoteError,
    },

    /// Import of an ID the remote does not know
    #[error("cannot import {kind} {id}: not found on the remote")]
    Import { kind: String, id: String },

    /// Lifecycle operation requested from a phase that does not allow it
    #[error("cannot {operation} a resource in phase {phase}")]
    InvalidTransition { operation: Operation, phase: Phase },
}

impl Error {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn translation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Translation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn mapping(path: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Mapping {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attribute path for local errors, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Validation { path, .. }
            | Error::Translation { path, .. }
            | Error::Mapping { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The engine never retries. Only opaque remote failures are worth
    /// handing to a caller that does.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Remote {
                source: RemoteError::Other(_),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_names_operation() {
        let err = Error::Remote {
            kind: "gateway".to_string(),
            operation: Operation::Update,
            source: RemoteError::Other(anyhow::anyhow!("API request failed: 500")),
        };
        let msg = err.to_string();
        assert!(msg.contains("gateway update failed"), "got: {}", msg);
        assert!(msg.contains("500"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_local_errors_carry_path() {
        let err = Error::validation("center_definition.name", "required attribute is missing");
        assert_eq!(err.path(), Some("center_definition.name"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_found_is_classified() {
        let err = RemoteError::NotFound { id: "7".to_string() };
        assert!(err.is_not_found());
        assert!(!RemoteError::Other(anyhow::anyhow!("boom")).is_not_found());
    }
}
