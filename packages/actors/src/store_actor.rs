//! Single-writer in-process store.
//!
//! [`StoreActor`] owns every queue, the job id counter, the in-progress
//! ledger and the server registry. It handles one message at a time, so
//! each store primitive runs to completion before the next one starts.
//! [`ActorStore`] is the cloneable handle the engine talks to.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use queue_core::{
    Job, JobId, JobStore, LeaseRecord, QueueError, QueueResult, ServerRecord, ServerStore,
};
use ractor::rpc::CallResult;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};

use crate::messages::StoreMessage;

/// All queue and registry data held by the store actor.
#[derive(Debug, Default)]
pub struct QueueState {
    queues: BTreeMap<String, VecDeque<Job>>,
    in_progress: BTreeMap<JobId, LeaseRecord>,
    last_job_id: JobId,
    servers: BTreeMap<String, ServerRecord>,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_mut(&mut self, name: &str) -> QueueResult<&mut VecDeque<Job>> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    pub fn create_queue(&mut self, name: &str) -> QueueResult<usize> {
        if self.queues.contains_key(name) {
            return Err(QueueError::QueueAlreadyExists(name.to_string()));
        }
        self.queues.insert(name.to_string(), VecDeque::new());
        Ok(self.queues.len())
    }

    pub fn delete_queue(&mut self, name: &str) -> QueueResult<Vec<Job>> {
        self.queues
            .remove(name)
            .map(Vec::from)
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    pub fn queue_names(&self) -> BTreeSet<String> {
        self.queues.keys().cloned().collect()
    }

    pub fn queue_jobs(&self, name: &str) -> QueueResult<Vec<Job>> {
        self.queues
            .get(name)
            .map(|jobs| jobs.iter().cloned().collect())
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    pub fn push_job(&mut self, name: &str, job: Job) -> QueueResult<usize> {
        let jobs = self.queue_mut(name)?;
        jobs.push_back(job);
        Ok(jobs.len())
    }

    /// Pop, allocate and record in one step. Nothing changes on error.
    pub fn lease_next_job(
        &mut self,
        name: &str,
        server_key: &str,
        start: f64,
    ) -> QueueResult<LeaseRecord> {
        let job = self
            .queue_mut(name)?
            .pop_front()
            .ok_or_else(|| QueueError::EmptyQueue(name.to_string()))?;

        self.last_job_id = JobId(self.last_job_id.get() + 1);
        let lease = LeaseRecord {
            job_id: self.last_job_id,
            queue: name.to_string(),
            server: server_key.to_string(),
            start,
            job,
        };
        self.in_progress.insert(lease.job_id, lease.clone());
        Ok(lease)
    }

    pub fn in_progress(&self) -> BTreeMap<JobId, LeaseRecord> {
        self.in_progress.clone()
    }

    pub fn requeue_lease(&mut self, job_id: JobId) -> QueueResult<LeaseRecord> {
        let queue = self
            .in_progress
            .get(&job_id)
            .map(|lease| lease.queue.clone())
            .ok_or(QueueError::JobNotFound(job_id))?;
        if !self.queues.contains_key(&queue) {
            return Err(QueueError::QueueNotFound(queue));
        }

        let lease = self
            .in_progress
            .remove(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))?;
        self.queue_mut(&queue)?.push_front(lease.job.clone());
        Ok(lease)
    }

    pub fn complete_lease(&mut self, job_id: JobId) -> QueueResult<LeaseRecord> {
        self.in_progress
            .remove(&job_id)
            .ok_or(QueueError::JobNotFound(job_id))
    }

    pub fn last_job_id(&self) -> JobId {
        self.last_job_id
    }

    pub fn put_server(&mut self, key: &str, record: ServerRecord) {
        self.servers.insert(key.to_string(), record);
    }

    pub fn get_server(&self, key: &str) -> Option<ServerRecord> {
        self.servers.get(key).cloned()
    }

    pub fn list_servers(&self) -> BTreeMap<String, ServerRecord> {
        self.servers.clone()
    }

    pub fn delete_server(&mut self, key: &str) -> bool {
        self.servers.remove(key).is_some()
    }
}

/// Actor serializing all access to a [`QueueState`].
pub struct StoreActor;

impl Actor for StoreActor {
    type Msg = StoreMessage;
    type State = QueueState;
    type Arguments = QueueState;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting in-process queue store");
        Ok(args)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        // A dropped reply port only means the caller gave up waiting.
        match message {
            StoreMessage::CreateQueue { name, reply } => {
                let _ = reply.send(state.create_queue(&name));
            }
            StoreMessage::DeleteQueue { name, reply } => {
                let _ = reply.send(state.delete_queue(&name));
            }
            StoreMessage::QueueNames { reply } => {
                let _ = reply.send(state.queue_names());
            }
            StoreMessage::QueueJobs { name, reply } => {
                let _ = reply.send(state.queue_jobs(&name));
            }
            StoreMessage::PushJob { name, job, reply } => {
                let _ = reply.send(state.push_job(&name, *job));
            }
            StoreMessage::LeaseNextJob {
                name,
                server_key,
                start,
                reply,
            } => {
                let _ = reply.send(state.lease_next_job(&name, &server_key, start));
            }
            StoreMessage::InProgress { reply } => {
                let _ = reply.send(state.in_progress());
            }
            StoreMessage::RequeueLease { job_id, reply } => {
                let _ = reply.send(state.requeue_lease(job_id));
            }
            StoreMessage::CompleteLease { job_id, reply } => {
                let _ = reply.send(state.complete_lease(job_id));
            }
            StoreMessage::LastJobId { reply } => {
                let _ = reply.send(state.last_job_id());
            }
            StoreMessage::PutServer { key, record, reply } => {
                state.put_server(&key, *record);
                let _ = reply.send(());
            }
            StoreMessage::GetServer { key, reply } => {
                let _ = reply.send(state.get_server(&key));
            }
            StoreMessage::ListServers { reply } => {
                let _ = reply.send(state.list_servers());
            }
            StoreMessage::DeleteServer { key, reply } => {
                let _ = reply.send(state.delete_server(&key));
            }
        }

        Ok(())
    }
}

/// Handle to a running [`StoreActor`].
#[derive(Clone)]
pub struct ActorStore {
    actor: ActorRef<StoreMessage>,
    timeout: Duration,
}

impl ActorStore {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Spawn an empty store actor.
    pub async fn spawn() -> Result<(Self, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
        let (actor, handle) = Actor::spawn(None, StoreActor, QueueState::new()).await?;
        Ok((Self::new(actor), handle))
    }

    pub fn new(actor: ActorRef<StoreMessage>) -> Self {
        Self {
            actor,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// How long to wait for the actor to answer.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn actor(&self) -> &ActorRef<StoreMessage> {
        &self.actor
    }

    async fn call<T, F>(&self, build: F) -> QueueResult<T>
    where
        T: Send + 'static,
        F: FnOnce(RpcReplyPort<T>) -> StoreMessage,
    {
        match ractor::rpc::call(&self.actor, build, Some(self.timeout)).await {
            Ok(CallResult::Success(value)) => Ok(value),
            Ok(CallResult::Timeout) => Err(QueueError::Store("store actor timed out".into())),
            Ok(CallResult::SenderError) => {
                Err(QueueError::Store("store actor dropped the request".into()))
            }
            Err(e) => Err(QueueError::Store(format!("store actor unavailable: {}", e))),
        }
    }
}

impl JobStore for ActorStore {
    async fn create_queue(&self, name: &str) -> QueueResult<usize> {
        let name = name.to_string();
        self.call(|reply| StoreMessage::CreateQueue { name, reply })
            .await?
    }

    async fn delete_queue(&self, name: &str) -> QueueResult<Vec<Job>> {
        let name = name.to_string();
        self.call(|reply| StoreMessage::DeleteQueue { name, reply })
            .await?
    }

    async fn queue_names(&self) -> QueueResult<BTreeSet<String>> {
        self.call(|reply| StoreMessage::QueueNames { reply }).await
    }

    async fn queue_jobs(&self, name: &str) -> QueueResult<Vec<Job>> {
        let name = name.to_string();
        self.call(|reply| StoreMessage::QueueJobs { name, reply })
            .await?
    }

    async fn push_job(&self, name: &str, job: &Job) -> QueueResult<usize> {
        let name = name.to_string();
        let job = Box::new(job.clone());
        self.call(|reply| StoreMessage::PushJob { name, job, reply })
            .await?
    }

    async fn lease_next_job(
        &self,
        name: &str,
        server_key: &str,
        start: f64,
    ) -> QueueResult<LeaseRecord> {
        let name = name.to_string();
        let server_key = server_key.to_string();
        self.call(|reply| StoreMessage::LeaseNextJob {
            name,
            server_key,
            start,
            reply,
        })
        .await?
    }

    async fn in_progress(&self) -> QueueResult<BTreeMap<JobId, LeaseRecord>> {
        self.call(|reply| StoreMessage::InProgress { reply }).await
    }

    async fn requeue_lease(&self, job_id: JobId) -> QueueResult<LeaseRecord> {
        self.call(|reply| StoreMessage::RequeueLease { job_id, reply })
            .await?
    }

    async fn complete_lease(&self, job_id: JobId) -> QueueResult<LeaseRecord> {
        self.call(|reply| StoreMessage::CompleteLease { job_id, reply })
            .await?
    }

    async fn last_job_id(&self) -> QueueResult<JobId> {
        self.call(|reply| StoreMessage::LastJobId { reply }).await
    }
}

impl ServerStore for ActorStore {
    async fn put_server(&self, key: &str, record: &ServerRecord) -> QueueResult<()> {
        let key = key.to_string();
        let record = Box::new(record.clone());
        self.call(|reply| StoreMessage::PutServer { key, record, reply })
            .await
    }

    async fn get_server(&self, key: &str) -> QueueResult<Option<ServerRecord>> {
        let key = key.to_string();
        self.call(|reply| StoreMessage::GetServer { key, reply }).await
    }

    async fn list_servers(&self) -> QueueResult<BTreeMap<String, ServerRecord>> {
        self.call(|reply| StoreMessage::ListServers { reply }).await
    }

    async fn delete_server(&self, key: &str) -> QueueResult<bool> {
        let key = key.to_string();
        self.call(|reply| StoreMessage::DeleteServer { key, reply })
            .await
    }
}
