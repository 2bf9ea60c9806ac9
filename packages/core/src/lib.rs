//! Core domain types for the vCon job queue system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and LeaseRecord for work items
//! - ServerKey and ServerRecord for the server registry
//! - QueueError, the error taxonomy every store reports through
//! - JobStore and ServerStore, the capabilities a backing store provides
//! - Events for real-time updates

mod error;
mod events;
mod job;
mod lease;
mod server;
mod store;

pub use error::{QueueError, QueueResult};
pub use events::JobEvent;
pub use job::{Job, JobId, MAX_VCON_UUIDS_PER_JOB};
pub use lease::{LeaseRecord, epoch_seconds, from_epoch_seconds};
pub use server::{LifecycleState, QueueInterest, ServerKey, ServerRecord};
pub use store::{JobStore, ServerStore};
