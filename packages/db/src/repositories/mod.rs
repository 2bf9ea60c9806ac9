//! Repository implementations for database operations.
//!
//! Stored functions report failures as `THROW "<code>:<detail>"`;
//! [`classify`] turns those back into typed queue errors.

mod lease_repo;
mod queue_repo;
mod server_repo;

pub use lease_repo::LeaseRepository;
pub use queue_repo::QueueRepository;
pub use server_repo::ServerRepository;

use queue_core::{JobId, QueueError};

const QUEUE_EXISTS: &str = "queue_exists:";
const QUEUE_NOT_FOUND: &str = "queue_not_found:";
const QUEUE_EMPTY: &str = "queue_empty:";
const JOB_NOT_FOUND: &str = "job_not_found:";

/// Messages of transactions rolled back because another writer got there first.
const CONFLICT_MARKERS: [&str; 2] = ["can be retried", "already exists"];

/// Text following a thrown error code, up to the end of the message.
fn detail<'a>(message: &'a str, code: &str) -> Option<&'a str> {
    message
        .find(code)
        .map(|at| message[at + code.len()..].trim_end_matches(['"', '\'', '`']).trim())
}

/// Map a database error onto the queue error taxonomy.
pub(crate) fn classify(err: surrealdb::Error) -> QueueError {
    let message = err.to_string();

    if let Some(name) = detail(&message, QUEUE_EXISTS) {
        return QueueError::QueueAlreadyExists(name.to_string());
    }
    if let Some(name) = detail(&message, QUEUE_NOT_FOUND) {
        return QueueError::QueueNotFound(name.to_string());
    }
    if let Some(name) = detail(&message, QUEUE_EMPTY) {
        return QueueError::EmptyQueue(name.to_string());
    }
    if let Some(id) = detail(&message, JOB_NOT_FOUND).and_then(|id| id.parse::<u64>().ok()) {
        return QueueError::JobNotFound(JobId(id));
    }
    if CONFLICT_MARKERS.iter().any(|marker| message.contains(marker)) {
        return QueueError::Conflict(message);
    }

    QueueError::Store(message)
}

/// Convert a job id into the integer parameter stored functions take.
pub(crate) fn job_id_param(job_id: JobId) -> Result<i64, QueueError> {
    i64::try_from(job_id.get()).map_err(|_| QueueError::JobNotFound(job_id))
}
