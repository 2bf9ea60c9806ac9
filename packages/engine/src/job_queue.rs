//! Job queue engine over an atomic backing store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use queue_core::{
    Job, JobEvent, JobId, JobStore, LeaseRecord, QueueError, QueueResult, epoch_seconds,
};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

/// Named FIFO job queues with leasing, backed by a shared store.
///
/// Every operation is a single atomic call on the store. The engine adds
/// payload validation, lease timestamps, logging and event broadcast; it
/// never retries and never expires leases.
pub struct JobQueue<S> {
    store: Arc<S>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl<S> Clone for JobQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

impl<S: JobStore> JobQueue<S> {
    /// Create an engine over `store`.
    pub fn new(store: Arc<S>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { store, event_tx }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    fn broadcast(&self, event: JobEvent) {
        // No subscribers is not an error.
        let _ = self.event_tx.send(event);
    }

    /// Register a new queue. Returns the number of registered queues.
    pub async fn create_queue(&self, name: &str) -> QueueResult<usize> {
        validate_queue_name(name)?;
        let count = self.store.create_queue(name).await?;
        tracing::info!(queue = name, queues = count, "created job queue");
        self.broadcast(JobEvent::QueueCreated {
            queue: name.to_string(),
            timestamp: Utc::now(),
        });
        Ok(count)
    }

    /// Remove a queue, returning the jobs that were still pending on it.
    ///
    /// Leases taken from the queue are left alone.
    pub async fn delete_queue(&self, name: &str) -> QueueResult<Vec<Job>> {
        let jobs = self.store.delete_queue(name).await?;
        tracing::info!(queue = name, drained = jobs.len(), "deleted job queue");
        self.broadcast(JobEvent::QueueDeleted {
            queue: name.to_string(),
            drained: jobs.len(),
            timestamp: Utc::now(),
        });
        Ok(jobs)
    }

    /// Snapshot of registered queue names.
    pub async fn list_queue_names(&self) -> QueueResult<BTreeSet<String>> {
        self.store.queue_names().await
    }

    /// Pending jobs of a queue in FIFO order.
    pub async fn list_queue_jobs(&self, name: &str) -> QueueResult<Vec<Job>> {
        self.store.queue_jobs(name).await
    }

    /// Validate and append a job to the tail of a queue.
    ///
    /// Returns the queue length after the push.
    pub async fn push_job(&self, name: &str, job: Job) -> QueueResult<usize> {
        job.validate()?;
        let depth = self.store.push_job(name, &job).await?;
        tracing::debug!(queue = name, depth, job_type = job.job_type(), "pushed job");
        self.broadcast(JobEvent::JobPushed {
            queue: name.to_string(),
            depth,
            timestamp: Utc::now(),
        });
        Ok(depth)
    }

    /// Push a `vcon_uuid` job referencing `uuids`.
    pub async fn push_vcon_uuids<I, T>(&self, name: &str, uuids: I) -> QueueResult<usize>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let job = Job::vcon_uuids(uuids)?;
        self.push_job(name, job).await
    }

    /// Lease the head job of `name` to the server identified by `server_key`.
    ///
    /// Fails with `QueueNotFound` or `EmptyQueue`; on success the job is no
    /// longer listed on the queue and a lease with a fresh job id exists.
    pub async fn lease_next_job(&self, name: &str, server_key: &str) -> QueueResult<LeaseRecord> {
        let start = epoch_seconds(Utc::now());
        let lease = self.store.lease_next_job(name, server_key, start).await?;
        tracing::debug!(
            queue = name,
            job_id = %lease.job_id,
            server = server_key,
            "leased job"
        );
        self.broadcast(JobEvent::JobLeased {
            job_id: lease.job_id,
            queue: lease.queue.clone(),
            server: lease.server.clone(),
            timestamp: Utc::now(),
        });
        Ok(lease)
    }

    /// Snapshot of all active leases keyed by job id.
    pub async fn list_in_progress(&self) -> QueueResult<BTreeMap<JobId, LeaseRecord>> {
        self.store.in_progress().await
    }

    /// Roll a lease back: its job goes to the head of the origin queue.
    ///
    /// If the origin queue was deleted this fails with `QueueNotFound` and the
    /// lease stays in the ledger.
    pub async fn requeue_lease(&self, job_id: JobId) -> QueueResult<LeaseRecord> {
        let lease = self.store.requeue_lease(job_id).await.inspect_err(|e| {
            if let QueueError::QueueNotFound(queue) = e {
                tracing::warn!(%job_id, queue = %queue, "cannot requeue, origin queue is gone");
            }
        })?;
        tracing::debug!(%job_id, queue = %lease.queue, "requeued job");
        self.broadcast(JobEvent::JobRequeued {
            job_id,
            queue: lease.queue.clone(),
            timestamp: Utc::now(),
        });
        Ok(lease)
    }

    /// Remove a finished lease and return it.
    ///
    /// The caller must already have applied the job's effect durably.
    pub async fn complete_lease(&self, job_id: JobId) -> QueueResult<LeaseRecord> {
        let lease = self.store.complete_lease(job_id).await?;
        let now = Utc::now();
        let duration_ms = (lease.held_for(now).max(0.0) * 1000.0) as u64;
        tracing::debug!(%job_id, queue = %lease.queue, duration_ms, "completed job");
        self.broadcast(JobEvent::JobCompleted {
            job_id,
            queue: lease.queue.clone(),
            duration_ms,
            timestamp: now,
        });
        Ok(lease)
    }

    /// Most recently allocated job id.
    pub async fn last_job_id(&self) -> QueueResult<JobId> {
        self.store.last_job_id().await
    }
}

fn validate_queue_name(name: &str) -> QueueResult<()> {
    if name.trim().is_empty() {
        return Err(QueueError::Validation("queue name must not be empty".into()));
    }
    Ok(())
}
