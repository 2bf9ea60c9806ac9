//! Registry of live server processes sharing the queue store.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use queue_core::{
    LifecycleState, QueueError, QueueInterest, QueueResult, ServerKey, ServerRecord, ServerStore,
    epoch_seconds,
};

/// Registration handle for the calling server process.
///
/// Owns this process's identity and lifecycle state; every change is
/// written through to the shared store with [`ServerRegistry::register`].
pub struct ServerRegistry<S> {
    store: Arc<S>,
    key: ServerKey,
    queues: BTreeMap<String, QueueInterest>,
    num_workers: usize,
    state: Mutex<LifecycleState>,
}

impl<S: ServerStore> ServerRegistry<S> {
    /// Create a registry handle. The process starts in `starting_up`.
    pub fn new(
        store: Arc<S>,
        key: ServerKey,
        queues: BTreeMap<String, QueueInterest>,
        num_workers: usize,
    ) -> Self {
        Self {
            store,
            key,
            queues,
            num_workers,
            state: Mutex::new(LifecycleState::StartingUp),
        }
    }

    fn state_guard(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identity of this server process.
    pub fn server_key(&self) -> &ServerKey {
        &self.key
    }

    /// Queues this server works on, with their weights.
    pub fn queues(&self) -> &BTreeMap<String, QueueInterest> {
        &self.queues
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state_guard()
    }

    fn record(&self, lifecycle_state: LifecycleState) -> ServerRecord {
        ServerRecord {
            host: self.key.host.clone(),
            port: self.key.port,
            pid: self.key.pid,
            start_time: self.key.start_time,
            queues: self.queues.clone(),
            num_workers: self.num_workers,
            lifecycle_state,
            last_heartbeat: epoch_seconds(Utc::now()),
        }
    }

    async fn publish(&self, lifecycle_state: LifecycleState) -> QueueResult<()> {
        let key = self.key.to_string();
        let record = self.record(lifecycle_state);
        self.store.put_server(&key, &record).await?;
        tracing::debug!(server = %key, state = %record.lifecycle_state, "registered server state");
        Ok(())
    }

    /// Store this server's record, stamping a fresh heartbeat.
    ///
    /// With `may_exist == false` an existing entry is unexpected and gets
    /// logged, but it is overwritten and registration still succeeds.
    pub async fn register(&self, may_exist: bool) -> QueueResult<()> {
        if !may_exist {
            let key = self.key.to_string();
            match self.store.get_server(&key).await {
                Ok(Some(existing)) => {
                    tracing::error!(
                        server = %key,
                        state = %existing.lifecycle_state,
                        "server already registered, overwriting"
                    );
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(server = %key, error = %e, "could not check prior registration"),
            }
        }

        self.publish(self.state()).await
    }

    /// Refresh `last_heartbeat`.
    pub async fn update_heartbeat(&self) -> QueueResult<()> {
        self.register(true).await
    }

    /// Move to `next` and publish it.
    ///
    /// Entering the current state again only refreshes the heartbeat. The
    /// local state only changes once the store has accepted the new record.
    pub async fn enter_state(&self, next: LifecycleState) -> QueueResult<()> {
        let current = self.state();
        if current != next && !current.can_transition_to(next) {
            return Err(QueueError::InvalidTransition { from: current, to: next });
        }

        self.publish(next).await?;

        let mut state = self.state_guard();
        if *state != next {
            tracing::info!(server = %self.key, from = %*state, to = %next, "server state change");
            *state = next;
        }
        Ok(())
    }

    /// Snapshot of every registered server, keyed by server key.
    pub async fn list_servers(&self) -> QueueResult<BTreeMap<String, ServerRecord>> {
        self.store.list_servers().await
    }

    /// Look up one server entry.
    pub async fn get_server(&self, key: &str) -> QueueResult<Option<ServerRecord>> {
        self.store.get_server(key).await
    }

    /// Remove this server's entry. Succeeds whether or not it existed.
    pub async fn unregister(&self) -> QueueResult<()> {
        let removed = self.store.delete_server(&self.key.to_string()).await?;
        tracing::info!(server = %self.key, removed, "server state unregistered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Server store that keeps one record and can be told to reject writes.
    #[derive(Default)]
    struct FlakyServers {
        failing: AtomicBool,
        records: Mutex<BTreeMap<String, ServerRecord>>,
    }

    impl ServerStore for FlakyServers {
        async fn put_server(&self, key: &str, record: &ServerRecord) -> QueueResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(QueueError::Store("unavailable".into()));
            }
            self.records.lock().unwrap().insert(key.to_string(), record.clone());
            Ok(())
        }

        async fn get_server(&self, key: &str) -> QueueResult<Option<ServerRecord>> {
            Ok(self.records.lock().unwrap().get(key).cloned())
        }

        async fn list_servers(&self) -> QueueResult<BTreeMap<String, ServerRecord>> {
            Ok(self.records.lock().unwrap().clone())
        }

        async fn delete_server(&self, key: &str) -> QueueResult<bool> {
            Ok(self.records.lock().unwrap().remove(key).is_some())
        }
    }

    fn registry(store: &Arc<FlakyServers>) -> ServerRegistry<FlakyServers> {
        let key = ServerKey::new("localhost", 8000, 4242, 1_700_000_000.25);
        ServerRegistry::new(Arc::clone(store), key, BTreeMap::new(), 1)
    }

    #[tokio::test]
    async fn failed_state_change_keeps_local_state() {
        let store = Arc::new(FlakyServers::default());
        let registry = registry(&store);
        registry.register(false).await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        let result = registry.enter_state(LifecycleState::Running).await;
        assert!(matches!(result, Err(QueueError::Store(_))));
        assert_eq!(registry.state(), LifecycleState::StartingUp);

        store.failing.store(false, Ordering::SeqCst);
        registry.enter_state(LifecycleState::Running).await.unwrap();
        assert_eq!(registry.state(), LifecycleState::Running);
        let key = registry.server_key().to_string();
        let stored = store.get_server(&key).await.unwrap().unwrap();
        assert_eq!(stored.lifecycle_state, LifecycleState::Running);
    }

    #[tokio::test]
    async fn invalid_transition_never_writes() {
        let store = Arc::new(FlakyServers::default());
        let registry = registry(&store);
        registry.enter_state(LifecycleState::Running).await.unwrap();
        registry.enter_state(LifecycleState::ShuttingDown).await.unwrap();

        let result = registry.enter_state(LifecycleState::Running).await;
        assert_eq!(
            result,
            Err(QueueError::InvalidTransition {
                from: LifecycleState::ShuttingDown,
                to: LifecycleState::Running,
            })
        );
        let key = registry.server_key().to_string();
        let stored = store.get_server(&key).await.unwrap().unwrap();
        assert_eq!(stored.lifecycle_state, LifecycleState::ShuttingDown);
    }
}
