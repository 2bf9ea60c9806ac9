//! In-progress lease records.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// A job popped from its queue and assigned to a worker.
///
/// Serialized as `{ "jobid", "queue", "server", "start", "job" }` with
/// `start` in float epoch seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseRecord {
    /// Id allocated when the job was leased.
    #[serde(rename = "jobid")]
    pub job_id: JobId,
    /// Queue the job was popped from.
    pub queue: String,
    /// Server key of the worker process holding the lease.
    pub server: String,
    /// Lease start, epoch seconds.
    pub start: f64,
    /// The queued payload as pushed.
    pub job: Job,
}

impl LeaseRecord {
    /// Lease start as a timestamp.
    pub fn started_at(&self) -> DateTime<Utc> {
        from_epoch_seconds(self.start)
    }

    /// Seconds the lease has been held at `now`.
    pub fn held_for(&self, now: DateTime<Utc>) -> f64 {
        epoch_seconds(now) - self.start
    }
}

/// Convert a timestamp to float epoch seconds (microsecond precision).
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Convert float epoch seconds back to a timestamp.
pub fn from_epoch_seconds(seconds: f64) -> DateTime<Utc> {
    let micros = (seconds * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
