//! Capability interfaces a backing store must provide.
//!
//! Each method is one indivisible unit against the store: no caller can
//! observe a job removed from its queue without its lease record, or a
//! lease record deleted without the job being back on its queue.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use crate::{Job, JobId, LeaseRecord, QueueResult, ServerRecord};

/// Atomic job queue primitives.
pub trait JobStore: Send + Sync + 'static {
    /// Register `name`. Returns the number of registered queues.
    fn create_queue(&self, name: &str) -> impl Future<Output = QueueResult<usize>> + Send;

    /// Unregister `name` and drain its pending jobs in order.
    fn delete_queue(&self, name: &str) -> impl Future<Output = QueueResult<Vec<Job>>> + Send;

    /// Names of all registered queues.
    fn queue_names(&self) -> impl Future<Output = QueueResult<BTreeSet<String>>> + Send;

    /// Pending jobs of `name` in FIFO order, without consuming them.
    fn queue_jobs(&self, name: &str) -> impl Future<Output = QueueResult<Vec<Job>>> + Send;

    /// Append `job` to the tail of `name`. Returns the new queue length.
    fn push_job(&self, name: &str, job: &Job) -> impl Future<Output = QueueResult<usize>> + Send;

    /// Pop the head of `name`, allocate the next job id and record the lease.
    fn lease_next_job(
        &self,
        name: &str,
        server_key: &str,
        start: f64,
    ) -> impl Future<Output = QueueResult<LeaseRecord>> + Send;

    /// Snapshot of the in-progress ledger.
    fn in_progress(&self) -> impl Future<Output = QueueResult<BTreeMap<JobId, LeaseRecord>>> + Send;

    /// Put a leased job back at the head of its origin queue and drop the lease.
    fn requeue_lease(&self, job_id: JobId) -> impl Future<Output = QueueResult<LeaseRecord>> + Send;

    /// Remove and return a lease whose job is done.
    fn complete_lease(&self, job_id: JobId) -> impl Future<Output = QueueResult<LeaseRecord>> + Send;

    /// Most recently allocated job id, `JobId(0)` before the first lease.
    fn last_job_id(&self) -> impl Future<Output = QueueResult<JobId>> + Send;
}

/// Storage for server registry entries, keyed by server key string.
pub trait ServerStore: Send + Sync + 'static {
    fn put_server(
        &self,
        key: &str,
        record: &ServerRecord,
    ) -> impl Future<Output = QueueResult<()>> + Send;

    fn get_server(&self, key: &str) -> impl Future<Output = QueueResult<Option<ServerRecord>>> + Send;

    fn list_servers(&self) -> impl Future<Output = QueueResult<BTreeMap<String, ServerRecord>>> + Send;

    /// Returns whether an entry was removed.
    fn delete_server(&self, key: &str) -> impl Future<Output = QueueResult<bool>> + Send;
}
