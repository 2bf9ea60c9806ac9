//! In-progress ledger and job id allocation.

use std::collections::BTreeMap;

use queue_core::{Job, JobId, LeaseRecord, QueueError, QueueResult};
use serde::Deserialize;

use super::{classify, job_id_param};
use crate::Database;

/// Repository for leases.
pub struct LeaseRepository;

/// Ledger row as stored; `job` is the JSON text taken off the queue.
#[derive(Debug, Deserialize)]
struct LeaseRow {
    jobid: i64,
    queue: String,
    server: String,
    start_time: f64,
    job: String,
}

impl LeaseRow {
    fn into_lease(self) -> QueueResult<LeaseRecord> {
        let job_id = u64::try_from(self.jobid)
            .map(JobId)
            .map_err(|_| QueueError::Store(format!("negative job id in ledger: {}", self.jobid)))?;

        Ok(LeaseRecord {
            job_id,
            queue: self.queue,
            server: self.server,
            start: self.start_time,
            job: Job::from_json(&self.job)?,
        })
    }
}

fn expect_row(row: Option<LeaseRow>, op: &str) -> QueueResult<LeaseRecord> {
    row.ok_or_else(|| QueueError::Store(format!("{} returned no lease", op)))?
        .into_lease()
}

impl LeaseRepository {
    /// Pop the head of `name` into a new lease for `server`.
    pub async fn lease_next(
        db: &Database,
        name: &str,
        server: &str,
        start_time: f64,
    ) -> QueueResult<LeaseRecord> {
        let mut result = db
            .query("RETURN fn::lease_next_job($name, $server, $start)")
            .bind(("name", name.to_string()))
            .bind(("server", server.to_string()))
            .bind(("start", start_time))
            .await
            .map_err(classify)?;

        let row: Option<LeaseRow> = result.take(0).map_err(classify)?;

        expect_row(row, "lease_next_job")
    }

    /// List all active leases.
    pub async fn list(db: &Database) -> QueueResult<BTreeMap<JobId, LeaseRecord>> {
        let mut result = db
            .query("SELECT jobid, queue, server, start_time, job FROM in_progress")
            .await
            .map_err(classify)?;

        let rows: Vec<LeaseRow> = result.take(0).map_err(classify)?;

        rows.into_iter()
            .map(|row| row.into_lease().map(|lease| (lease.job_id, lease)))
            .collect()
    }

    /// Push a lease's job back to the head of its queue and drop the lease.
    pub async fn requeue(db: &Database, job_id: JobId) -> QueueResult<LeaseRecord> {
        let mut result = db
            .query("RETURN fn::requeue_lease($jobid)")
            .bind(("jobid", job_id_param(job_id)?))
            .await
            .map_err(classify)?;

        let row: Option<LeaseRow> = result.take(0).map_err(classify)?;

        expect_row(row, "requeue_lease")
    }

    /// Remove a lease and return it.
    pub async fn complete(db: &Database, job_id: JobId) -> QueueResult<LeaseRecord> {
        let mut result = db
            .query("RETURN fn::complete_lease($jobid)")
            .bind(("jobid", job_id_param(job_id)?))
            .await
            .map_err(classify)?;

        let row: Option<LeaseRow> = result.take(0).map_err(classify)?;

        expect_row(row, "complete_lease")
    }

    /// Most recently allocated job id, zero before the first lease.
    pub async fn last_job_id(db: &Database) -> QueueResult<JobId> {
        let mut result = db
            .query("SELECT VALUE current FROM job_counter:jobid")
            .await
            .map_err(classify)?;

        let current: Vec<i64> = result.take(0).map_err(classify)?;

        Ok(JobId(current.first().copied().unwrap_or(0).max(0) as u64))
    }
}
