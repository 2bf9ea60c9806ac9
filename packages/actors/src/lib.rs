//! Actor system for the job queue.
//!
//! # Architecture
//!
//! - `StoreActor` - Single-writer in-process store behind the `ActorStore` handle
//! - `Supervisor` - Owns the workers and heartbeat of one server process
//! - `WorkerActor` - Leases jobs from its queues and runs their handlers
//! - `HeartbeatActor` - Keeps the server registry entry fresh
//!
//! # Usage
//!
//! ```ignore
//! use actors::{ActorStore, SupervisorArgs, SupervisorMessage, start_supervisor};
//!
//! let (store, _store_handle) = ActorStore::spawn().await?;
//! let (supervisor, handle) = start_supervisor(args).await?;
//!
//! supervisor.send_message(SupervisorMessage::Shutdown)?;
//! handle.await?;
//! ```

mod handler;
mod heartbeat;
mod messages;
mod store_actor;
mod supervisor;
mod worker_actor;

pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry};
pub use heartbeat::{HeartbeatActor, HeartbeatArgs};
pub use messages::{HeartbeatMessage, StoreMessage, SupervisorMessage, WorkerMessage};
pub use store_actor::{ActorStore, QueueState, StoreActor};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use worker_actor::{JobOutcome, QueueSchedule, WorkerActor, WorkerArgs, WorkerConfig};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
