//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Events emitted by the job queue engine after a store operation succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A queue was registered.
    QueueCreated {
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A queue was removed along with its pending jobs.
    QueueDeleted {
        queue: String,
        drained: usize,
        timestamp: DateTime<Utc>,
    },
    /// A job was appended to a queue.
    JobPushed {
        queue: String,
        depth: usize,
        timestamp: DateTime<Utc>,
    },
    /// A job was leased to a server.
    JobLeased {
        job_id: JobId,
        queue: String,
        server: String,
        timestamp: DateTime<Utc>,
    },
    /// A lease was rolled back onto the head of its queue.
    JobRequeued {
        job_id: JobId,
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A lease was completed.
    JobCompleted {
        job_id: JobId,
        queue: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::QueueCreated { timestamp, .. }
            | JobEvent::QueueDeleted { timestamp, .. }
            | JobEvent::JobPushed { timestamp, .. }
            | JobEvent::JobLeased { timestamp, .. }
            | JobEvent::JobRequeued { timestamp, .. }
            | JobEvent::JobCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Queue the event concerns.
    pub fn queue(&self) -> &str {
        match self {
            JobEvent::QueueCreated { queue, .. }
            | JobEvent::QueueDeleted { queue, .. }
            | JobEvent::JobPushed { queue, .. }
            | JobEvent::JobLeased { queue, .. }
            | JobEvent::JobRequeued { queue, .. }
            | JobEvent::JobCompleted { queue, .. } => queue,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobLeased { job_id, .. }
            | JobEvent::JobRequeued { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::QueueCreated { queue, .. } => format!("Queue '{}' created", queue),
            JobEvent::QueueDeleted { queue, drained, .. } => {
                format!("Queue '{}' deleted, {} pending jobs drained", queue, drained)
            }
            JobEvent::JobPushed { queue, depth, .. } => {
                format!("Job pushed to '{}' (depth {})", queue, depth)
            }
            JobEvent::JobLeased {
                job_id,
                queue,
                server,
                ..
            } => format!("Job {} leased from '{}' by {}", job_id, queue, server),
            JobEvent::JobRequeued { job_id, queue, .. } => {
                format!("Job {} requeued to '{}'", job_id, queue)
            }
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
        }
    }
}
