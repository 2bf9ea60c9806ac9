use std::collections::BTreeMap;
use std::sync::Arc;

use engine::{JobQueue, ServerRegistry};
use queue_core::{QueueInterest, ServerKey};

use db::{DbConfig, DbError, SurrealStore};

/// Each call opens its own `mem://` datastore, so tests never share state.
pub async fn setup_store() -> Result<Arc<SurrealStore>, DbError> {
    let store = SurrealStore::connect(&DbConfig::memory()).await?;
    Ok(Arc::new(store))
}

pub async fn setup_queue() -> Result<JobQueue<SurrealStore>, DbError> {
    Ok(JobQueue::new(setup_store().await?))
}

pub fn registry(
    store: &Arc<SurrealStore>,
    port: u16,
    queues: &[(&str, u32)],
) -> ServerRegistry<SurrealStore> {
    let key = ServerKey::new("localhost", port, 4242, 1_700_000_000.25);
    let queues = queues
        .iter()
        .map(|(name, weight)| (name.to_string(), QueueInterest { weight: *weight }))
        .collect::<BTreeMap<_, _>>();
    ServerRegistry::new(Arc::clone(store), key, queues, 2)
}
