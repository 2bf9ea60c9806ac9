//! Error taxonomy shared by every queue store and the engine.

use thiserror::Error;

use crate::{JobId, LifecycleState};

/// Result alias for queue and registry operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Every failure a queue operation can report.
///
/// Nothing is retried inside the engine. Callers branch on the variant:
/// `EmptyQueue` is a normal poll signal for workers. `Conflict` means a
/// concurrent writer won and nothing was applied; it and `Store` are transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue already exists: {0}")]
    QueueAlreadyExists(String),

    #[error("queue does not exist: {0}")]
    QueueNotFound(String),

    #[error("no jobs in queue: {0}")]
    EmptyQueue(String),

    #[error("in progress job does not exist: {0}")]
    JobNotFound(JobId),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("server state cannot change from {from} to {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("store write conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(String),
}

impl QueueError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Conflict(_) | QueueError::Store(_))
    }
}
