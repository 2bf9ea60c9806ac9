//! Periodic heartbeat for this server's registry entry.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use engine::ServerRegistry;
use queue_core::ServerStore;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::HeartbeatMessage;

pub struct HeartbeatArgs<S> {
    pub registry: Arc<ServerRegistry<S>>,
    pub interval: Duration,
}

pub struct HeartbeatState<S> {
    registry: Arc<ServerRegistry<S>>,
    ticker: JoinHandle<()>,
    /// Consecutive failed beats.
    failures: u32,
}

/// Actor refreshing `last_heartbeat` every interval.
pub struct HeartbeatActor<S> {
    _store: PhantomData<fn() -> S>,
}

impl<S> HeartbeatActor<S> {
    pub fn new() -> Self {
        Self {
            _store: PhantomData,
        }
    }
}

impl<S> Default for HeartbeatActor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ServerStore> Actor for HeartbeatActor<S> {
    type Msg = HeartbeatMessage;
    type State = HeartbeatState<S>;
    type Arguments = HeartbeatArgs<S>;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            server = %args.registry.server_key(),
            interval_secs = args.interval.as_secs_f64(),
            "Starting heartbeat"
        );

        let ticker = myself.send_interval(args.interval, || HeartbeatMessage::Beat);

        Ok(HeartbeatState {
            registry: args.registry,
            ticker,
            failures: 0,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.ticker.abort();
        Ok(())
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            HeartbeatMessage::Beat => match state.registry.update_heartbeat().await {
                Ok(()) => {
                    if state.failures > 0 {
                        tracing::info!(failures = state.failures, "heartbeat recovered");
                    }
                    state.failures = 0;
                }
                Err(e) => {
                    state.failures += 1;
                    tracing::warn!(error = %e, failures = state.failures, "heartbeat failed");
                }
            },
        }

        Ok(())
    }
}
