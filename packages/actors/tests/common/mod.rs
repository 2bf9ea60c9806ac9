use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use actors::ActorStore;
use engine::{JobQueue, ServerRegistry};
use queue_core::{QueueInterest, ServerKey};

pub struct Harness {
    pub store: Arc<ActorStore>,
    pub queue: JobQueue<ActorStore>,
    pub registry: Arc<ServerRegistry<ActorStore>>,
}

/// Fresh store actor, engine and registry for one test.
pub async fn setup(queues: &[(&str, u32)], num_workers: usize) -> Harness {
    let (store, _handle) = ActorStore::spawn().await.expect("spawn store actor");
    let store = Arc::new(store);
    let queue = JobQueue::new(Arc::clone(&store));

    let interests = queues
        .iter()
        .map(|(name, weight)| (name.to_string(), QueueInterest { weight: *weight }))
        .collect::<BTreeMap<_, _>>();
    let key = ServerKey::new("localhost", 8000, std::process::id(), 1_700_000_000.5);
    let registry = Arc::new(ServerRegistry::new(
        Arc::clone(&store),
        key,
        interests,
        num_workers,
    ));

    Harness {
        store,
        queue,
        registry,
    }
}

/// Poll `check` until it holds or about two seconds pass.
pub async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
