#![allow(clippy::disallowed_methods)]

mod common;

use std::collections::BTreeSet;
use std::error::Error;

use chrono::{Duration, Utc};
use queue_core::{Job, JobEvent, JobId, LifecycleState, QueueError, ServerStore};

use engine::{find_orphaned_leases, remove_server};

const UUID_1: &str = "0b6c5e4a-8f1d-4c3b-9a2e-000000000001";
const UUID_2: &str = "0b6c5e4a-8f1d-4c3b-9a2e-000000000002";
const UUID_3: &str = "0b6c5e4a-8f1d-4c3b-9a2e-000000000003";
const SERVER: &str = "localhost:8000:4242:1700000000.25";

fn uuids(jobs: &[Job]) -> Vec<&str> {
    jobs.iter()
        .flat_map(|job| job.vcon_uuid_list().iter().map(String::as_str))
        .collect()
}

#[tokio::test]
async fn test_queue_registry() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;

    assert!(queue.list_queue_names().await?.is_empty());
    assert_eq!(queue.create_queue("ingest").await?, 1);
    assert_eq!(queue.create_queue("index").await?, 2);

    let duplicate = queue.create_queue("ingest").await;
    assert_eq!(duplicate, Err(QueueError::QueueAlreadyExists("ingest".into())));

    let names = queue.list_queue_names().await?;
    assert_eq!(names, BTreeSet::from(["index".to_string(), "ingest".to_string()]));

    queue.push_vcon_uuids("ingest", [UUID_1]).await?;
    queue.push_vcon_uuids("ingest", [UUID_2]).await?;
    let drained = queue.delete_queue("ingest").await?;
    assert_eq!(uuids(&drained), vec![UUID_1, UUID_2]);

    assert_eq!(
        queue.delete_queue("ingest").await,
        Err(QueueError::QueueNotFound("ingest".into()))
    );
    assert_eq!(
        queue.list_queue_jobs("ingest").await,
        Err(QueueError::QueueNotFound("ingest".into()))
    );
    assert_eq!(queue.create_queue("ingest").await?, 2);
    assert!(queue.list_queue_jobs("ingest").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_push_is_fifo_and_validated() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    queue.create_queue("ingest").await?;

    assert_eq!(queue.push_vcon_uuids("ingest", [UUID_1]).await?, 1);
    assert_eq!(queue.push_vcon_uuids("ingest", [UUID_2]).await?, 2);
    assert_eq!(queue.push_vcon_uuids("ingest", [UUID_3]).await?, 3);

    let jobs = queue.list_queue_jobs("ingest").await?;
    assert_eq!(uuids(&jobs), vec![UUID_1, UUID_2, UUID_3]);

    let missing = queue.push_vcon_uuids("missing", [UUID_1]).await;
    assert_eq!(missing, Err(QueueError::QueueNotFound("missing".into())));
    assert!(!queue.list_queue_names().await?.contains("missing"));

    let too_many = queue.push_vcon_uuids("ingest", [UUID_1, UUID_2]).await;
    assert!(matches!(too_many, Err(QueueError::Validation(_))));
    let empty = queue.push_vcon_uuids("ingest", Vec::<String>::new()).await;
    assert!(matches!(empty, Err(QueueError::Validation(_))));
    assert_eq!(queue.list_queue_jobs("ingest").await?.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_lease_lifecycle() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let mut events = queue.subscribe();
    queue.create_queue("ingest").await?;
    queue.push_vcon_uuids("ingest", [UUID_1]).await?;
    queue.push_vcon_uuids("ingest", [UUID_2]).await?;
    assert_eq!(queue.last_job_id().await?, JobId(0));

    let before = Utc::now();
    let first = queue.lease_next_job("ingest", SERVER).await?;
    assert_eq!(first.queue, "ingest");
    assert_eq!(first.server, SERVER);
    assert_eq!(first.job.vcon_uuid_list(), [UUID_1.to_string()]);
    assert!(first.started_at() >= before - Duration::seconds(1));

    let second = queue.lease_next_job("ingest", SERVER).await?;
    assert!(second.job_id > first.job_id);
    assert_eq!(queue.last_job_id().await?, second.job_id);
    assert!(queue.list_queue_jobs("ingest").await?.is_empty());

    let leases = queue.list_in_progress().await?;
    assert_eq!(leases.len(), 2);
    assert_eq!(leases.get(&first.job_id), Some(&first));

    assert_eq!(
        queue.lease_next_job("ingest", SERVER).await,
        Err(QueueError::EmptyQueue("ingest".into()))
    );
    assert_eq!(
        queue.lease_next_job("missing", SERVER).await,
        Err(QueueError::QueueNotFound("missing".into()))
    );

    // Requeue puts the job back at the head.
    queue.push_vcon_uuids("ingest", [UUID_3]).await?;
    let requeued = queue.requeue_lease(first.job_id).await?;
    assert_eq!(requeued.job_id, first.job_id);
    let jobs = queue.list_queue_jobs("ingest").await?;
    assert_eq!(uuids(&jobs), vec![UUID_1, UUID_3]);

    let again = queue.lease_next_job("ingest", SERVER).await?;
    assert_eq!(again.job.vcon_uuid_list(), [UUID_1.to_string()]);
    assert!(again.job_id > second.job_id);

    let done = queue.complete_lease(second.job_id).await?;
    assert_eq!(done.job_id, second.job_id);
    assert_eq!(
        queue.complete_lease(second.job_id).await,
        Err(QueueError::JobNotFound(second.job_id))
    );
    assert_eq!(
        queue.requeue_lease(JobId(9_999)).await,
        Err(QueueError::JobNotFound(JobId(9_999)))
    );

    let remaining = queue.list_in_progress().await?;
    assert_eq!(remaining.keys().copied().collect::<Vec<_>>(), vec![again.job_id]);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(JobEvent::QueueCreated { .. })));
    assert!(seen.iter().any(|e| matches!(e, JobEvent::JobRequeued { job_id, .. } if *job_id == first.job_id)));
    assert!(seen.iter().any(|e| matches!(e, JobEvent::JobCompleted { job_id, .. } if *job_id == second.job_id)));

    Ok(())
}

#[tokio::test]
async fn test_requeue_after_queue_deleted() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    queue.create_queue("ingest").await?;
    queue.push_vcon_uuids("ingest", [UUID_1]).await?;
    let lease = queue.lease_next_job("ingest", SERVER).await?;

    let drained = queue.delete_queue("ingest").await?;
    assert!(drained.is_empty());

    assert_eq!(
        queue.requeue_lease(lease.job_id).await,
        Err(QueueError::QueueNotFound("ingest".into()))
    );
    // The failed requeue leaves the lease in place.
    assert!(queue.list_in_progress().await?.contains_key(&lease.job_id));

    let done = queue.complete_lease(lease.job_id).await?;
    assert_eq!(done.job, lease.job);
    assert!(queue.list_in_progress().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_job_ids_shared_across_queues() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    queue.create_queue("a").await?;
    queue.create_queue("b").await?;
    queue.push_vcon_uuids("a", [UUID_1]).await?;
    queue.push_vcon_uuids("b", [UUID_2]).await?;
    queue.push_vcon_uuids("a", [UUID_3]).await?;

    let mut ids = Vec::new();
    for name in ["a", "b", "a"] {
        ids.push(queue.lease_next_job(name, SERVER).await?.job_id);
    }
    assert_eq!(ids, vec![JobId(1), JobId(2), JobId(3)]);

    Ok(())
}

#[tokio::test]
async fn test_server_registry() -> Result<(), Box<dyn Error>> {
    let store = common::setup_store().await?;
    let registry = common::registry(&store, 8000, &[("ingest", 3), ("index", 1)]);
    let key = registry.server_key().to_string();
    assert_eq!(key, SERVER);

    assert!(registry.list_servers().await?.is_empty());
    registry.register(false).await?;

    let record = registry.get_server(&key).await?.ok_or("server not registered")?;
    assert_eq!(record.lifecycle_state, LifecycleState::StartingUp);
    assert_eq!(record.num_workers, 2);
    assert_eq!(record.queues.get("ingest").map(|q| q.weight), Some(3));
    assert_eq!(record.server_key(), *registry.server_key());

    let first_beat = record.last_heartbeat;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    registry.update_heartbeat().await?;
    let record = registry.get_server(&key).await?.ok_or("server missing")?;
    assert!(record.last_heartbeat > first_beat);

    registry.enter_state(LifecycleState::Running).await?;
    assert_eq!(registry.state(), LifecycleState::Running);
    let backwards = registry.enter_state(LifecycleState::StartingUp).await;
    assert_eq!(
        backwards,
        Err(QueueError::InvalidTransition {
            from: LifecycleState::Running,
            to: LifecycleState::StartingUp,
        })
    );
    let record = registry.get_server(&key).await?.ok_or("server missing")?;
    assert_eq!(record.lifecycle_state, LifecycleState::Running);

    let other = common::registry(&store, 8001, &[("ingest", 1)]);
    other.register(false).await?;
    assert_eq!(registry.list_servers().await?.len(), 2);

    registry.enter_state(LifecycleState::ShuttingDown).await?;
    registry.unregister().await?;
    registry.unregister().await?;
    let servers = store.list_servers().await?;
    assert_eq!(servers.len(), 1);
    assert!(servers.contains_key(&other.server_key().to_string()));

    Ok(())
}

#[tokio::test]
async fn test_find_orphaned_leases() -> Result<(), Box<dyn Error>> {
    let store = common::setup_store().await?;
    let queue = engine::JobQueue::new(store.clone());
    let live = common::registry(&store, 8000, &[("ingest", 1)]);
    live.register(false).await?;
    let live_key = live.server_key().to_string();

    queue.create_queue("ingest").await?;
    queue.push_vcon_uuids("ingest", [UUID_1]).await?;
    queue.push_vcon_uuids("ingest", [UUID_2]).await?;
    let held = queue.lease_next_job("ingest", &live_key).await?;
    let orphan = queue.lease_next_job("ingest", "gone:9000:1:1.0").await?;

    let found = find_orphaned_leases(store.as_ref(), Utc::now(), 60.0).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].job_id, orphan.job_id);

    // Far enough in the future every heartbeat is stale.
    let later = Utc::now() + Duration::seconds(120);
    let found = find_orphaned_leases(store.as_ref(), later, 60.0).await?;
    let ids: BTreeSet<_> = found.iter().map(|lease| lease.job_id).collect();
    assert_eq!(ids, BTreeSet::from([held.job_id, orphan.job_id]));

    // Detection never touches the ledger.
    assert_eq!(queue.list_in_progress().await?.len(), 2);

    // Dropping the live server's entry orphans its lease too.
    assert!(remove_server(store.as_ref(), &live_key).await?);
    assert!(!remove_server(store.as_ref(), &live_key).await?);
    let found = find_orphaned_leases(store.as_ref(), Utc::now(), 60.0).await?;
    assert_eq!(found.len(), 2);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_leases_are_exclusive() -> Result<(), Box<dyn Error>> {
    const JOBS: usize = 40;
    const WORKERS: usize = 8;

    let queue = common::setup_queue().await?;
    queue.create_queue("ingest").await?;
    for n in 0..JOBS {
        queue.push_vcon_uuids("ingest", [format!("uuid-{}", n)]).await?;
    }

    let mut tasks = Vec::new();
    for _ in 0..WORKERS {
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            let mut leased = Vec::new();
            loop {
                match queue.lease_next_job("ingest", SERVER).await {
                    Ok(lease) => leased.push(lease),
                    Err(QueueError::EmptyQueue(_)) => return Ok(leased),
                    Err(e) => return Err(e),
                }
            }
        }));
    }

    let mut leases = Vec::new();
    for task in tasks {
        leases.extend(task.await??);
    }

    assert_eq!(leases.len(), JOBS);
    let ids: BTreeSet<_> = leases.iter().map(|lease| lease.job_id).collect();
    assert_eq!(ids.len(), JOBS);
    let payloads: BTreeSet<_> = leases
        .iter()
        .map(|lease| lease.job.vcon_uuid_list().to_vec())
        .collect();
    assert_eq!(payloads.len(), JOBS);
    assert_eq!(queue.list_in_progress().await?.len(), JOBS);
    assert_eq!(queue.last_job_id().await?, JobId(JOBS as u64));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_resolution_consumes_lease_once() -> Result<(), Box<dyn Error>> {
    const ROUNDS: usize = 20;
    const RACERS: usize = 8;

    let queue = common::setup_queue().await?;
    queue.create_queue("ingest").await?;

    for round in 0..ROUNDS {
        queue.push_vcon_uuids("ingest", [format!("uuid-{}", round)]).await?;
        let lease = queue.lease_next_job("ingest", SERVER).await?;

        let mut tasks = Vec::new();
        for racer in 0..RACERS {
            let queue = queue.clone();
            let job_id = lease.job_id;
            tasks.push(tokio::spawn(async move {
                if racer % 2 == 0 {
                    queue.complete_lease(job_id).await
                } else {
                    queue.requeue_lease(job_id).await
                }
            }));
        }

        let mut succeeded = 0;
        for task in tasks {
            match task.await? {
                Ok(resolved) => {
                    assert_eq!(resolved.job_id, lease.job_id);
                    succeeded += 1;
                }
                Err(e) => assert_eq!(e, QueueError::JobNotFound(lease.job_id)),
            }
        }
        assert_eq!(succeeded, 1, "round {} resolved {} times", round, succeeded);
        assert!(queue.list_in_progress().await?.is_empty());

        // A requeue winner leaves exactly one copy behind; clear it for the next round.
        let pending = queue.list_queue_jobs("ingest").await?;
        assert!(pending.len() <= 1);
        if !pending.is_empty() {
            let again = queue.lease_next_job("ingest", SERVER).await?;
            queue.complete_lease(again.job_id).await?;
        }
    }

    Ok(())
}
