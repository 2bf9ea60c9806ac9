//! Worker actor for executing jobs.

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use engine::JobQueue;
use futures_util::FutureExt;
use queue_core::{JobStore, LeaseRecord, QueueError, QueueInterest};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::handler::JobHandlerRegistry;
use crate::messages::WorkerMessage;

/// Weighted round-robin order over the queues a worker serves.
///
/// A queue with weight `w` appears `w` times per round, spread out so
/// heavier queues are polled more often without starving lighter ones.
#[derive(Debug, Clone)]
pub struct QueueSchedule {
    slots: Vec<String>,
    cursor: usize,
}

impl QueueSchedule {
    pub fn new(queues: &BTreeMap<String, QueueInterest>) -> Self {
        let rounds = queues.values().map(|q| q.weight).max().unwrap_or(0);
        let mut slots = Vec::new();
        for round in 0..rounds {
            for (name, interest) in queues {
                if interest.weight > round {
                    slots.push(name.clone());
                }
            }
        }
        Self { slots, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots in one full round.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Next queue to poll.
    pub fn next_queue(&mut self) -> Option<&str> {
        if self.slots.is_empty() {
            return None;
        }
        let at = self.cursor % self.slots.len();
        self.cursor = (at + 1) % self.slots.len();
        Some(self.slots[at].as_str())
    }
}

/// Worker tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Idle wait after every queue came up empty.
    pub poll_interval: Duration,
    /// Upper bound on the backoff after store errors.
    pub max_backoff: Duration,
    /// Per-job time limit; `None` lets handlers run indefinitely.
    pub job_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            job_timeout: None,
        }
    }
}

/// How a leased job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
    TimedOut,
    Panicked,
    NoHandler,
}

/// What one poll found.
enum PollResult {
    Leased(LeaseRecord),
    Idle,
    StoreError(QueueError),
}

/// State for the worker actor.
pub struct WorkerState<S> {
    pub worker_id: String,
    queue: JobQueue<S>,
    server_key: String,
    handlers: Arc<JobHandlerRegistry>,
    schedule: QueueSchedule,
    config: WorkerConfig,
    backoff: Option<Duration>,
}

/// Worker actor arguments.
pub struct WorkerArgs<S> {
    pub worker_id: String,
    pub queue: JobQueue<S>,
    pub server_key: String,
    pub handlers: Arc<JobHandlerRegistry>,
    pub schedule: QueueSchedule,
    pub config: WorkerConfig,
}

impl<S: JobStore> WorkerState<S> {
    /// Walk one round of the schedule until a lease succeeds.
    async fn poll(&mut self) -> PollResult {
        let mut tried = BTreeSet::new();

        for _ in 0..self.schedule.len() {
            let Some(name) = self.schedule.next_queue().map(str::to_string) else {
                break;
            };
            if !tried.insert(name.clone()) {
                continue;
            }

            match self.queue.lease_next_job(&name, &self.server_key).await {
                Ok(lease) => return PollResult::Leased(lease),
                Err(QueueError::EmptyQueue(_)) => {}
                Err(QueueError::QueueNotFound(_)) => {
                    tracing::warn!(worker = %self.worker_id, queue = %name, "work queue does not exist");
                }
                Err(e) => return PollResult::StoreError(e),
            }
        }

        PollResult::Idle
    }

    async fn run(&self, lease: &LeaseRecord) -> JobOutcome {
        let Some(handler) = self.handlers.handler_for(lease.job.job_type()) else {
            return JobOutcome::NoHandler;
        };

        let work = AssertUnwindSafe(handler.handle(lease)).catch_unwind();
        let result = match self.config.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => return JobOutcome::TimedOut,
            },
            None => work.await,
        };

        match result {
            Ok(Ok(())) => JobOutcome::Succeeded,
            Ok(Err(reason)) => JobOutcome::Failed(reason),
            Err(_) => JobOutcome::Panicked,
        }
    }

    /// Run the leased job and settle its lease.
    async fn process(&self, lease: LeaseRecord) -> JobOutcome {
        let job_id = lease.job_id;
        let outcome = self.run(&lease).await;

        if outcome == JobOutcome::Succeeded {
            if let Err(e) = self.queue.complete_lease(job_id).await {
                tracing::error!(worker = %self.worker_id, %job_id, error = %e, "failed to complete lease");
            }
            return outcome;
        }

        tracing::warn!(
            worker = %self.worker_id,
            %job_id,
            queue = %lease.queue,
            outcome = ?outcome,
            "job did not succeed, requeueing"
        );
        if let Err(e) = self.queue.requeue_lease(job_id).await {
            tracing::error!(worker = %self.worker_id, %job_id, error = %e, "failed to requeue lease");
        }
        outcome
    }

    fn next_backoff(&mut self) -> Duration {
        let next = match self.backoff {
            Some(current) => (current * 2).min(self.config.max_backoff),
            None => self.config.poll_interval.min(self.config.max_backoff),
        };
        self.backoff = Some(next);
        next
    }
}

/// Worker actor that leases jobs and runs them through the handler registry.
pub struct WorkerActor<S> {
    _store: PhantomData<fn() -> S>,
}

impl<S> WorkerActor<S> {
    pub fn new() -> Self {
        Self {
            _store: PhantomData,
        }
    }
}

impl<S> Default for WorkerActor<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: JobStore> Actor for WorkerActor<S> {
    type Msg = WorkerMessage;
    type State = WorkerState<S>;
    type Arguments = WorkerArgs<S>;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        if args.schedule.is_empty() {
            tracing::warn!(worker = %args.worker_id, "worker has no queues to poll");
        }

        Ok(WorkerState {
            worker_id: args.worker_id,
            queue: args.queue,
            server_key: args.server_key,
            handlers: args.handlers,
            schedule: args.schedule,
            config: args.config,
            backoff: None,
        })
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        myself.send_message(WorkerMessage::Poll)?;
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => match state.poll().await {
                PollResult::Leased(lease) => {
                    state.backoff = None;
                    if state.process(lease).await == JobOutcome::Succeeded {
                        myself.send_message(WorkerMessage::Poll)?;
                    } else {
                        // Failed jobs sit at the head again; give them a moment.
                        myself.send_after(state.config.poll_interval, || WorkerMessage::Poll);
                    }
                }
                PollResult::Idle => {
                    state.backoff = None;
                    myself.send_after(state.config.poll_interval, || WorkerMessage::Poll);
                }
                PollResult::StoreError(e) => {
                    let wait = state.next_backoff();
                    tracing::warn!(
                        worker = %state.worker_id,
                        error = %e,
                        retry_in_ms = wait.as_millis() as u64,
                        "store unavailable, backing off"
                    );
                    myself.send_after(wait, || WorkerMessage::Poll);
                }
            },

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                myself.stop(None);
            }
        }

        Ok(())
    }
}
