//! Distributed job queue engine and server registry.
//!
//! Both types are explicit handles over a store implementing the
//! `queue_core` capability traits; create them at startup and pass them to
//! whatever owns the worker loop or API handlers.

mod job_queue;
mod server_registry;
mod supervision;

pub use job_queue::JobQueue;
pub use server_registry::ServerRegistry;
pub use supervision::{find_orphaned_leases, remove_server};
