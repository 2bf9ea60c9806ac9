//! Queue registry and FIFO list operations.

use std::collections::BTreeSet;

use queue_core::{Job, QueueResult};

use super::classify;
use crate::Database;

/// Repository for named job queues.
pub struct QueueRepository;

impl QueueRepository {
    /// Register a new queue. Returns the number of registered queues.
    pub async fn create(db: &Database, name: &str) -> QueueResult<usize> {
        let mut result = db
            .query("RETURN fn::create_queue($name)")
            .bind(("name", name.to_string()))
            .await
            .map_err(classify)?;

        let count: Option<i64> = result.take(0).map_err(classify)?;

        Ok(count.unwrap_or(0).max(0) as usize)
    }

    /// Unregister a queue and return its drained jobs.
    pub async fn delete(db: &Database, name: &str) -> QueueResult<Vec<Job>> {
        let mut result = db
            .query("RETURN fn::delete_queue($name)")
            .bind(("name", name.to_string()))
            .await
            .map_err(classify)?;

        let jobs: Vec<String> = result.take(0).map_err(classify)?;

        decode_jobs(&jobs)
    }

    /// List all registered queue names.
    pub async fn names(db: &Database) -> QueueResult<BTreeSet<String>> {
        let mut result = db
            .query("SELECT VALUE name FROM job_queue")
            .await
            .map_err(classify)?;

        let names: Vec<String> = result.take(0).map_err(classify)?;

        Ok(names.into_iter().collect())
    }

    /// Pending jobs of a queue, head first.
    pub async fn jobs(db: &Database, name: &str) -> QueueResult<Vec<Job>> {
        let mut result = db
            .query("RETURN fn::queue_jobs($name)")
            .bind(("name", name.to_string()))
            .await
            .map_err(classify)?;

        let jobs: Vec<String> = result.take(0).map_err(classify)?;

        decode_jobs(&jobs)
    }

    /// Append a job to the tail of a queue. Returns the new length.
    pub async fn push(db: &Database, name: &str, job: &Job) -> QueueResult<usize> {
        let mut result = db
            .query("RETURN fn::push_job($name, $job)")
            .bind(("name", name.to_string()))
            .bind(("job", job.to_json()?))
            .await
            .map_err(classify)?;

        let depth: Option<i64> = result.take(0).map_err(classify)?;

        Ok(depth.unwrap_or(0).max(0) as usize)
    }
}

fn decode_jobs(jobs: &[String]) -> QueueResult<Vec<Job>> {
    jobs.iter().map(|job| Job::from_json(job)).collect()
}
