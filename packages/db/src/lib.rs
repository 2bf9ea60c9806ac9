//! SurrealDB integration for the job queue system.
//!
//! Queues, the job id counter, the in-progress ledger and the server
//! registry live in one database that every server process connects to.
//! Multi-record operations run as stored functions so each one commits
//! atomically.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage
//! - `remote`: Connect to a shared SurrealDB server over WebSocket

mod connection;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect_db};
pub use schema::init_schema;
pub use store::SurrealStore;
