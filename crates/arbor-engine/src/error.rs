use std::time::Duration;

use arbor_persist::{MessageRole, PersistError};
use serde::Serialize;
use thiserror::Error;

/// Coarse error classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Thread or message absent or soft-deleted
    NotFound,
    /// The request is not legal for the current tree
    InvalidState,
    /// The completion provider failed or timed out
    UpstreamFailure,
    /// The store failed; multi-step writes were rolled back
    StorageFailure,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Parent message not found: {0}")]
    ParentNotFound(String),

    #[error("Message {message_id} has role {role}; only user messages can be edited")]
    InvalidRole { message_id: String, role: MessageRole },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Completion failed: {0}")]
    Upstream(String),

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[source] PersistError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::ThreadNotFound(_) | EngineError::MessageNotFound(_) => ErrorKind::NotFound,
            EngineError::ParentNotFound(_)
            | EngineError::InvalidRole { .. }
            | EngineError::InvalidState(_) => ErrorKind::InvalidState,
            EngineError::Upstream(_) | EngineError::Timeout(_) => ErrorKind::UpstreamFailure,
            EngineError::Storage(_) => ErrorKind::StorageFailure,
        }
    }
}

impl From<PersistError> for EngineError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::ThreadNotFound(id) => EngineError::ThreadNotFound(id),
            PersistError::MessageNotFound(id) => EngineError::MessageNotFound(id),
            PersistError::ParentNotFound(id) => EngineError::ParentNotFound(id),
            other => EngineError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_errors_keep_not_found_identity() {
        let err: EngineError = PersistError::MessageNotFound("m1".into()).into();
        assert!(matches!(err, EngineError::MessageNotFound(ref id) if id == "m1"));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: EngineError = PersistError::Conflict("orphan".into()).into();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }

    #[test]
    fn test_kinds() {
        let invalid = EngineError::InvalidRole {
            message_id: "m".into(),
            role: MessageRole::Assistant,
        };
        assert_eq!(invalid.kind(), ErrorKind::InvalidState);
        assert_eq!(EngineError::ParentNotFound("p".into()).kind(), ErrorKind::InvalidState);
        assert_eq!(EngineError::Timeout(Duration::from_secs(1)).kind(), ErrorKind::UpstreamFailure);
    }
}
