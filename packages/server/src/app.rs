//! Server process lifecycle.

use std::sync::Arc;

use actors::{
    ActorRef, JobHandlerRegistry, SupervisorArgs, SupervisorMessage, WorkerConfig,
    start_supervisor,
};
use chrono::Utc;
use db::{DbError, SurrealStore};
use engine::{JobQueue, ServerRegistry};
use queue_core::{JobStore, LifecycleState, QueueError, ServerKey, ServerStore};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::settings::Settings;

/// Errors while starting or stopping the server.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("Worker error: {0}")]
    Workers(String),
}

/// A running server: registered, heartbeating and working its queues.
pub struct App {
    queue: JobQueue<SurrealStore>,
    registry: Arc<ServerRegistry<SurrealStore>>,
    supervisor: ActorRef<SupervisorMessage>,
    supervisor_handle: JoinHandle<()>,
}

impl App {
    /// Connect, register in `starting_up`, start workers, enter `running`.
    pub async fn start(settings: &Settings, handlers: JobHandlerRegistry) -> Result<Self, AppError> {
        let store = Arc::new(SurrealStore::connect(&settings.storage).await?);
        let queue = JobQueue::new(Arc::clone(&store));

        let key = ServerKey::for_current_process(settings.host.clone(), settings.port, Utc::now());
        let registry = Arc::new(ServerRegistry::new(
            store,
            key,
            settings.work_queues.clone(),
            settings.num_workers,
        ));
        registry.register(false).await?;
        tracing::info!(server = %registry.server_key(), "server registered");

        let args = SupervisorArgs {
            queue: queue.clone(),
            registry: Arc::clone(&registry),
            handlers: Arc::new(handlers),
            num_workers: settings.num_workers,
            worker_config: WorkerConfig {
                poll_interval: settings.poll_interval,
                ..WorkerConfig::default()
            },
            heartbeat_interval: settings.heartbeat_interval,
        };
        let (supervisor, supervisor_handle) = match start_supervisor(args).await {
            Ok(started) => started,
            Err(e) => {
                if let Err(cleanup) = registry.unregister().await {
                    tracing::warn!(error = %cleanup, "failed to unregister after startup error");
                }
                return Err(AppError::Workers(e.to_string()));
            }
        };

        let supervisor_handle = enter_running(&registry, &supervisor, supervisor_handle).await?;

        Ok(Self {
            queue,
            registry,
            supervisor,
            supervisor_handle,
        })
    }

    pub fn queue(&self) -> &JobQueue<SurrealStore> {
        &self.queue
    }

    pub fn registry(&self) -> &ServerRegistry<SurrealStore> {
        &self.registry
    }

    /// Enter `shutting_down`, let workers finish, then unregister.
    pub async fn shutdown(self) -> Result<(), AppError> {
        self.registry.enter_state(LifecycleState::ShuttingDown).await?;

        stop_supervisor(&self.supervisor, self.supervisor_handle).await?;

        self.registry.unregister().await?;
        tracing::info!(server = %self.registry.server_key(), "server stopped");
        Ok(())
    }
}

/// Publish `running`; on failure stop the workers and drop the registry entry.
async fn enter_running<S: JobStore + ServerStore>(
    registry: &ServerRegistry<S>,
    supervisor: &ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
) -> Result<JoinHandle<()>, AppError> {
    let Err(e) = registry.enter_state(LifecycleState::Running).await else {
        return Ok(handle);
    };

    if let Err(stop) = stop_supervisor(supervisor, handle).await {
        tracing::warn!(error = %stop, "failed to stop workers after startup error");
    }
    if let Err(cleanup) = registry.unregister().await {
        tracing::warn!(error = %cleanup, "failed to unregister after startup error");
    }
    Err(e.into())
}

/// Ask the supervisor to stop its workers and wait for it to exit.
async fn stop_supervisor(
    supervisor: &ActorRef<SupervisorMessage>,
    handle: JoinHandle<()>,
) -> Result<(), AppError> {
    if supervisor.send_message(SupervisorMessage::Shutdown).is_ok() {
        handle.await.map_err(|e| AppError::Workers(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use actors::{ActorStore, WorkerConfig};
    use queue_core::QueueInterest;

    use super::*;

    #[tokio::test]
    async fn failed_running_transition_stops_workers_and_unregisters() {
        let (store, _store_handle) = ActorStore::spawn().await.unwrap();
        let store = Arc::new(store);
        let queues = BTreeMap::from([("ingest".to_string(), QueueInterest { weight: 1 })]);
        let key = ServerKey::new("localhost", 8000, 4242, 1_700_000_000.25);
        let registry = Arc::new(ServerRegistry::new(Arc::clone(&store), key, queues, 1));
        registry.register(false).await.unwrap();
        // Already past `running`, so entering it again is rejected.
        registry.enter_state(LifecycleState::Running).await.unwrap();
        registry.enter_state(LifecycleState::ShuttingDown).await.unwrap();

        let args = SupervisorArgs {
            queue: JobQueue::new(Arc::clone(&store)),
            registry: Arc::clone(&registry),
            handlers: Arc::new(JobHandlerRegistry::new()),
            num_workers: 1,
            worker_config: WorkerConfig {
                poll_interval: Duration::from_millis(10),
                ..WorkerConfig::default()
            },
            heartbeat_interval: Duration::from_secs(60),
        };
        let (supervisor, handle) = start_supervisor(args).await.unwrap();

        let result = enter_running(&registry, &supervisor, handle).await;
        assert!(matches!(
            result,
            Err(AppError::Queue(QueueError::InvalidTransition { .. }))
        ));
        assert!(supervisor.send_message(SupervisorMessage::Shutdown).is_err());
        let key = registry.server_key().to_string();
        assert!(registry.get_server(&key).await.unwrap().is_none());
    }
}
