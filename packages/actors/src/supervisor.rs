//! Supervisor actor owning the workers and heartbeat of one server.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use engine::{JobQueue, ServerRegistry};
use queue_core::{JobStore, ServerStore};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};

use crate::handler::JobHandlerRegistry;
use crate::heartbeat::{HeartbeatActor, HeartbeatArgs};
use crate::messages::{HeartbeatMessage, SupervisorMessage, WorkerMessage};
use crate::worker_actor::{QueueSchedule, WorkerActor, WorkerArgs, WorkerConfig};

/// How long a child may take to stop on shutdown; workers finish their job first.
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Supervisor actor arguments.
pub struct SupervisorArgs<S> {
    pub queue: JobQueue<S>,
    pub registry: Arc<ServerRegistry<S>>,
    pub handlers: Arc<JobHandlerRegistry>,
    pub num_workers: usize,
    pub worker_config: WorkerConfig,
    pub heartbeat_interval: Duration,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    workers: Vec<ActorRef<WorkerMessage>>,
    heartbeat: Option<ActorRef<HeartbeatMessage>>,
}

/// Supervisor actor that manages workers and the heartbeat.
pub struct Supervisor<S> {
    _store: PhantomData<fn() -> S>,
}

impl<S> Supervisor<S> {
    pub fn new() -> Self {
        Self {
            _store: PhantomData,
        }
    }
}

impl<S> Default for Supervisor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore + ServerStore> Actor for Supervisor<S> {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs<S>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let server_key = args.registry.server_key().to_string();
        tracing::info!(server = %server_key, workers = args.num_workers, "Starting job queue supervisor");

        let schedule = QueueSchedule::new(args.registry.queues());
        let mut workers = Vec::with_capacity(args.num_workers);
        for n in 1..=args.num_workers {
            let worker_args = WorkerArgs {
                worker_id: format!("worker-{}", n),
                queue: args.queue.clone(),
                server_key: server_key.clone(),
                handlers: Arc::clone(&args.handlers),
                schedule: schedule.clone(),
                config: args.worker_config.clone(),
            };
            let (worker, _handle) =
                Actor::spawn_linked(None, WorkerActor::<S>::new(), worker_args, myself.get_cell())
                    .await
                    .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;
            workers.push(worker);
        }

        let heartbeat_args = HeartbeatArgs {
            registry: args.registry,
            interval: args.heartbeat_interval,
        };
        let (heartbeat, _handle) = Actor::spawn_linked(
            None,
            HeartbeatActor::<S>::new(),
            heartbeat_args,
            myself.get_cell(),
        )
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn heartbeat: {}", e)))?;

        Ok(SupervisorState {
            workers,
            heartbeat: Some(heartbeat),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::ActiveWorkers { reply } => {
                let _ = reply.send(state.workers.len());
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");

                // Workers finish the job in hand before stopping.
                for worker in state.workers.drain(..) {
                    if let Err(e) = worker.stop_and_wait(None, Some(CHILD_STOP_TIMEOUT)).await {
                        tracing::warn!(error = ?e, "worker did not stop cleanly");
                    }
                }
                // Wait out any beat in flight so nothing re-registers afterwards.
                if let Some(heartbeat) = state.heartbeat.take()
                    && let Err(e) = heartbeat.stop_and_wait(None, Some(CHILD_STOP_TIMEOUT)).await
                {
                    tracing::warn!(error = ?e, "heartbeat did not stop cleanly");
                }

                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::info!(actor = %cell.get_id(), ?reason, "child actor stopped");
                state.workers.retain(|w| w.get_id() != cell.get_id());
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                tracing::error!(actor = %cell.get_id(), error = %err, "child actor failed");
                state.workers.retain(|w| w.get_id() != cell.get_id());
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start a supervisor with `args.num_workers` workers and a heartbeat.
pub async fn start_supervisor<S: JobStore + ServerStore>(
    args: SupervisorArgs<S>,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let (actor, handle) = Actor::spawn(None, Supervisor::<S>::new(), args).await?;

    Ok((actor, handle))
}
