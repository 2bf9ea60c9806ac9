//! [`JobStore`] and [`ServerStore`] over a shared SurrealDB database.
//!
//! Queue mutations go through `SurrealStore::write`: writers on one
//! handle (and its clones) take turns, and a transaction the datastore
//! rejects as conflicting is retried a few times. Processes sharing a
//! remote database rely on the stored functions failing for the loser.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use queue_core::{
    Job, JobId, JobStore, LeaseRecord, QueueError, QueueResult, ServerRecord, ServerStore,
};
use tokio::sync::Mutex;

use crate::repositories::{LeaseRepository, QueueRepository, ServerRepository};
use crate::{Database, DbConfig, DbError, connect_db, init_schema};

/// Store shared by every server process pointed at the same database.
#[derive(Clone)]
pub struct SurrealStore {
    db: Database,
    writes: Arc<Mutex<()>>,
}

/// Attempts per write before a conflict is reported to the caller.
const CONFLICT_ATTEMPTS: u32 = 5;

impl SurrealStore {
    /// Wrap an already connected database. The schema must be initialized.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Connect and initialize the schema.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let db = connect_db(config).await?;
        init_schema(&db).await?;
        Ok(Self::new(db))
    }

    /// Underlying connection.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run one queue mutation exclusively, retrying write conflicts.
    async fn write<T, F, Fut>(&self, op: F) -> QueueResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = QueueResult<T>>,
    {
        let _turn = self.writes.lock().await;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(QueueError::Conflict(reason)) if attempt < CONFLICT_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "write conflict, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

impl JobStore for SurrealStore {
    async fn create_queue(&self, name: &str) -> QueueResult<usize> {
        let db = &self.db;
        self.write(move || QueueRepository::create(db, name)).await
    }

    async fn delete_queue(&self, name: &str) -> QueueResult<Vec<Job>> {
        let db = &self.db;
        self.write(move || QueueRepository::delete(db, name)).await
    }

    async fn queue_names(&self) -> QueueResult<BTreeSet<String>> {
        QueueRepository::names(&self.db).await
    }

    async fn queue_jobs(&self, name: &str) -> QueueResult<Vec<Job>> {
        QueueRepository::jobs(&self.db, name).await
    }

    async fn push_job(&self, name: &str, job: &Job) -> QueueResult<usize> {
        let db = &self.db;
        self.write(move || QueueRepository::push(db, name, job)).await
    }

    async fn lease_next_job(
        &self,
        name: &str,
        server_key: &str,
        start: f64,
    ) -> QueueResult<LeaseRecord> {
        let db = &self.db;
        self.write(move || LeaseRepository::lease_next(db, name, server_key, start))
            .await
    }

    async fn in_progress(&self) -> QueueResult<BTreeMap<JobId, LeaseRecord>> {
        LeaseRepository::list(&self.db).await
    }

    async fn requeue_lease(&self, job_id: JobId) -> QueueResult<LeaseRecord> {
        let db = &self.db;
        self.write(move || LeaseRepository::requeue(db, job_id)).await
    }

    async fn complete_lease(&self, job_id: JobId) -> QueueResult<LeaseRecord> {
        let db = &self.db;
        self.write(move || LeaseRepository::complete(db, job_id)).await
    }

    async fn last_job_id(&self) -> QueueResult<JobId> {
        LeaseRepository::last_job_id(&self.db).await
    }
}

impl ServerStore for SurrealStore {
    async fn put_server(&self, key: &str, record: &ServerRecord) -> QueueResult<()> {
        ServerRepository::put(&self.db, key, record).await
    }

    async fn get_server(&self, key: &str) -> QueueResult<Option<ServerRecord>> {
        ServerRepository::get(&self.db, key).await
    }

    async fn list_servers(&self) -> QueueResult<BTreeMap<String, ServerRecord>> {
        ServerRepository::list(&self.db).await
    }

    async fn delete_server(&self, key: &str) -> QueueResult<bool> {
        ServerRepository::delete(&self.db, key).await
    }
}
