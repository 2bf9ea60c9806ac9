//! Message types for actor communication.

use std::collections::{BTreeMap, BTreeSet};

use queue_core::{Job, JobId, LeaseRecord, QueueResult, ServerRecord};
use ractor::RpcReplyPort;

/// Messages for the StoreActor. One variant per store primitive.
#[derive(Debug)]
pub enum StoreMessage {
    CreateQueue {
        name: String,
        reply: RpcReplyPort<QueueResult<usize>>,
    },

    DeleteQueue {
        name: String,
        reply: RpcReplyPort<QueueResult<Vec<Job>>>,
    },

    QueueNames {
        reply: RpcReplyPort<BTreeSet<String>>,
    },

    QueueJobs {
        name: String,
        reply: RpcReplyPort<QueueResult<Vec<Job>>>,
    },

    PushJob {
        name: String,
        job: Box<Job>,
        reply: RpcReplyPort<QueueResult<usize>>,
    },

    LeaseNextJob {
        name: String,
        server_key: String,
        start: f64,
        reply: RpcReplyPort<QueueResult<LeaseRecord>>,
    },

    InProgress {
        reply: RpcReplyPort<BTreeMap<JobId, LeaseRecord>>,
    },

    RequeueLease {
        job_id: JobId,
        reply: RpcReplyPort<QueueResult<LeaseRecord>>,
    },

    CompleteLease {
        job_id: JobId,
        reply: RpcReplyPort<QueueResult<LeaseRecord>>,
    },

    LastJobId {
        reply: RpcReplyPort<JobId>,
    },

    PutServer {
        key: String,
        record: Box<ServerRecord>,
        reply: RpcReplyPort<()>,
    },

    GetServer {
        key: String,
        reply: RpcReplyPort<Option<ServerRecord>>,
    },

    ListServers {
        reply: RpcReplyPort<BTreeMap<String, ServerRecord>>,
    },

    DeleteServer {
        key: String,
        reply: RpcReplyPort<bool>,
    },
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Try to lease and run one job.
    Poll,

    /// Stop after the job in hand, if any.
    Shutdown,
}

/// Messages for the HeartbeatActor.
#[derive(Debug)]
pub enum HeartbeatMessage {
    /// Refresh this server's heartbeat.
    Beat,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Number of workers still alive.
    ActiveWorkers { reply: RpcReplyPort<usize> },

    /// Stop workers and heartbeat, then the supervisor itself.
    Shutdown,
}
