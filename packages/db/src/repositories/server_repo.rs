//! Server registry persistence.

use std::collections::BTreeMap;

use queue_core::{QueueResult, ServerRecord};
use serde::Deserialize;

use super::classify;
use crate::{Database, DbError};

/// Repository for server registry entries.
pub struct ServerRepository;

#[derive(Debug, Deserialize)]
struct ServerRow {
    key: String,
    record: String,
}

fn decode(json: &str) -> QueueResult<ServerRecord> {
    serde_json::from_str(json).map_err(|e| DbError::from(e).into())
}

impl ServerRepository {
    /// Create or overwrite the entry for `key`.
    pub async fn put(db: &Database, key: &str, record: &ServerRecord) -> QueueResult<()> {
        let json = serde_json::to_string(record).map_err(DbError::from)?;

        db.query("UPSERT type::thing('server', $key) CONTENT { key: $key, record: $record }")
            .bind(("key", key.to_string()))
            .bind(("record", json))
            .await
            .map_err(classify)?
            .check()
            .map_err(classify)?;

        Ok(())
    }

    /// Get one entry.
    pub async fn get(db: &Database, key: &str) -> QueueResult<Option<ServerRecord>> {
        let mut result = db
            .query("SELECT VALUE record FROM type::thing('server', $key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(classify)?;

        let records: Vec<String> = result.take(0).map_err(classify)?;

        records.first().map(|json| decode(json)).transpose()
    }

    /// List every entry keyed by server key.
    pub async fn list(db: &Database) -> QueueResult<BTreeMap<String, ServerRecord>> {
        let mut result = db
            .query("SELECT key, record FROM server")
            .await
            .map_err(classify)?;

        let rows: Vec<ServerRow> = result.take(0).map_err(classify)?;

        rows.into_iter()
            .map(|row| decode(&row.record).map(|record| (row.key, record)))
            .collect()
    }

    /// Delete an entry. Returns whether it existed.
    pub async fn delete(db: &Database, key: &str) -> QueueResult<bool> {
        let mut result = db
            .query("RETURN fn::delete_server($key)")
            .bind(("key", key.to_string()))
            .await
            .map_err(classify)?;

        let existed: Option<bool> = result.take(0).map_err(classify)?;

        Ok(existed.unwrap_or(false))
    }
}
