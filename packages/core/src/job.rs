//! Job domain types for work items in the queue.

use serde::{Deserialize, Serialize};

use crate::QueueError;

/// Most vCon UUIDs a single job may reference today.
///
/// The wire shape already carries a list; processing of multi-vCon jobs
/// is not supported yet, so pushes are limited to one UUID.
pub const MAX_VCON_UUIDS_PER_JOB: usize = 1;

/// Identifier allocated to a job when it is leased.
///
/// Ids come from a single shared counter, so they are strictly increasing
/// and never reused. Queued jobs have no id.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// The raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable job payload, tagged by `job_type` on the wire.
///
/// ```json
/// { "job_type": "vcon_uuid", "vcon_uuid": ["<uuid>"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum Job {
    /// Process the referenced vCons.
    VconUuid { vcon_uuid: Vec<String> },
}

impl Job {
    /// Build a vCon reference job, validating the UUID list.
    pub fn vcon_uuids<I, S>(uuids: I) -> Result<Self, QueueError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let job = Job::VconUuid {
            vcon_uuid: uuids.into_iter().map(Into::into).collect(),
        };
        job.validate()?;
        Ok(job)
    }

    /// The `job_type` tag, used to route the job to a handler.
    pub fn job_type(&self) -> &'static str {
        match self {
            Job::VconUuid { .. } => "vcon_uuid",
        }
    }

    /// vCon UUIDs referenced by this job.
    pub fn vcon_uuid_list(&self) -> &[String] {
        match self {
            Job::VconUuid { vcon_uuid } => vcon_uuid,
        }
    }

    /// Check the payload shape before it is allowed onto a queue.
    pub fn validate(&self) -> Result<(), QueueError> {
        match self {
            Job::VconUuid { vcon_uuid } => {
                if vcon_uuid.is_empty() {
                    return Err(QueueError::Validation(
                        "vcon_uuid list must contain at least one UUID".into(),
                    ));
                }
                if vcon_uuid.len() > MAX_VCON_UUIDS_PER_JOB {
                    return Err(QueueError::Validation(format!(
                        "vcon_uuid list has {} UUIDs, currently only {} is supported",
                        vcon_uuid.len(),
                        MAX_VCON_UUIDS_PER_JOB
                    )));
                }
                Ok(())
            }
        }
    }

    /// Encode the job the way it is stored in a queue.
    pub fn to_json(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Store(format!("encode job: {}", e)))
    }

    /// Decode a job previously stored with [`Job::to_json`].
    pub fn from_json(json: &str) -> Result<Self, QueueError> {
        serde_json::from_str(json).map_err(|e| QueueError::Store(format!("decode job: {}", e)))
    }
}
