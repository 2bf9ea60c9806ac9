//! Helpers for an external supervisor watching over leases.
//!
//! The engine itself never expires a lease. A supervisor can use
//! [`find_orphaned_leases`] to spot work held by servers that stopped
//! heartbeating and decide for itself whether to requeue it, and
//! [`remove_server`] to drop a dead server's registry entry.

use chrono::{DateTime, Utc};
use queue_core::{JobStore, LeaseRecord, QueueResult, ServerStore};

/// Leases whose assigned server is unregistered or has a heartbeat older
/// than `max_heartbeat_age` seconds at `now`.
pub async fn find_orphaned_leases<S>(
    store: &S,
    now: DateTime<Utc>,
    max_heartbeat_age: f64,
) -> QueueResult<Vec<LeaseRecord>>
where
    S: JobStore + ServerStore,
{
    let servers = store.list_servers().await?;
    let leases = store.in_progress().await?;

    Ok(leases
        .into_values()
        .filter(|lease| {
            servers
                .get(&lease.server)
                .is_none_or(|server| server.is_stale(now, max_heartbeat_age))
        })
        .collect())
}

/// Drop another server's registry entry, typically one found dead.
///
/// Returns whether an entry existed. Leases it held are left alone.
pub async fn remove_server<S: ServerStore>(store: &S, key: &str) -> QueueResult<bool> {
    let removed = store.delete_server(key).await?;
    if removed {
        tracing::info!(server = key, "removed server state");
    }
    Ok(removed)
}
