//! Integration tests: full cycles across replicas sharing one remote.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use mindwtr_core::{
    Attachment, BlobStore, CollectionName, DataStore, MemoryBlobStore, MemoryStore, SyncOutcome,
    Task,
};
use mindwtr_sync_engine::{
    Clock, MockTransport, StaticTransportFactory, SyncBackend, SyncConfig, SyncEvent,
    SyncOrchestrator, Transport,
};
use mindwtr_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct Replica {
    orchestrator: SyncOrchestrator,
    store: Arc<MemoryStore>,
    blobs: Arc<MemoryBlobStore>,
}

/// Builds a replica syncing through the shared in-memory remote.
fn replica(transport: Arc<MockTransport>, config: SyncConfig) -> Replica {
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let factory = StaticTransportFactory::new(Arc::clone(&transport) as Arc<dyn Transport>);
    let orchestrator = SyncOrchestrator::new(
        SyncBackend::File,
        config,
        Arc::clone(&store) as Arc<dyn DataStore>,
        Arc::clone(&blobs) as Arc<dyn BlobStore>,
        Arc::new(factory),
        Arc::new(FixedClock(timestamp(1))),
    );
    Replica {
        orchestrator,
        store,
        blobs,
    }
}

#[tokio::test]
async fn two_replicas_converge() {
    quiet_test_logging();
    let remote = Arc::new(MockTransport::new());
    let a = replica(Arc::clone(&remote), SyncConfig::new());
    let b = replica(Arc::clone(&remote), SyncConfig::new());

    // A creates a task and syncs it up.
    a.store
        .mutate(|s| s.insert_task(task("t1", "Buy milk", timestamp(2))));
    assert!(a.orchestrator.perform_sync().await.success);

    // B pulls it.
    assert!(b.orchestrator.perform_sync().await.success);
    assert_eq!(b.store.snapshot().tasks["t1"].title, "Buy milk");

    // B edits and syncs; A picks the edit up on its next cycle.
    b.store
        .mutate(|s| s.insert_task(task("t1", "Buy oat milk", timestamp(3))));
    assert!(b.orchestrator.perform_sync().await.success);
    assert!(a.orchestrator.perform_sync().await.success);
    assert_eq!(a.store.snapshot().tasks["t1"].title, "Buy oat milk");

    // Clean convergence: no conflicts anywhere.
    assert_eq!(
        a.orchestrator.status().last_result,
        Some(SyncOutcome::Success)
    );
}

#[tokio::test]
async fn tombstone_propagates_between_replicas() {
    quiet_test_logging();
    let remote = Arc::new(MockTransport::new());
    let a = replica(Arc::clone(&remote), SyncConfig::new());
    let b = replica(Arc::clone(&remote), SyncConfig::new());

    a.store
        .mutate(|s| s.insert_task(task("t1", "temp", timestamp(2))));
    a.orchestrator.perform_sync().await;
    b.orchestrator.perform_sync().await;
    assert!(b.store.snapshot().tasks.contains_key("t1"));

    // A deletes; the tombstone must arrive at B, not a hard removal.
    a.store.mutate(|s| {
        let task = s.tasks.get_mut("t1").expect("task exists");
        task.mark_deleted(timestamp(3));
    });
    a.orchestrator.perform_sync().await;
    b.orchestrator.perform_sync().await;

    let merged = b.store.snapshot();
    let tombstone = &merged.tasks["t1"];
    assert_eq!(tombstone.deleted_at, Some(timestamp(3)));
}

#[tokio::test]
async fn concurrent_edits_resolve_identically_on_both_replicas() {
    quiet_test_logging();
    let remote = Arc::new(MockTransport::new());
    let a = replica(Arc::clone(&remote), SyncConfig::new());
    let b = replica(Arc::clone(&remote), SyncConfig::new());

    a.store
        .mutate(|s| s.insert_task(task("t1", "original", timestamp(2))));
    a.orchestrator.perform_sync().await;
    b.orchestrator.perform_sync().await;

    // Diverge while "offline".
    a.store
        .mutate(|s| s.insert_task(task("t1", "A's edit", timestamp(3))));
    b.store
        .mutate(|s| s.insert_task(task("t1", "B's edit", timestamp(4))));

    a.orchestrator.perform_sync().await;
    let report = b.orchestrator.perform_sync().await;
    assert_eq!(report.stats[&CollectionName::Tasks].conflicts, 1);
    assert_eq!(
        b.orchestrator.status().last_result,
        Some(SyncOutcome::Conflict)
    );

    a.orchestrator.perform_sync().await;
    // Recency wins everywhere.
    assert_eq!(a.store.snapshot().tasks["t1"].title, "B's edit");
    assert_eq!(b.store.snapshot().tasks["t1"].title, "B's edit");
}

#[tokio::test]
async fn attachment_content_follows_the_snapshot() {
    quiet_test_logging();
    let remote = Arc::new(MockTransport::new());
    let a = replica(Arc::clone(&remote), SyncConfig::new());
    let b = replica(Arc::clone(&remote), SyncConfig::new());

    let attachment = Attachment::file("receipt.pdf", "Receipt", timestamp(2));
    let attachment_id = attachment.id.clone();
    a.blobs
        .insert(attachment_id.clone(), Bytes::from_static(b"%PDF-1.7"));
    a.store.mutate(|s| {
        let mut task = Task::new("expense", timestamp(2));
        task.id = "t1".into();
        task.attachments.push(attachment);
        s.insert_task(task);
    });

    let report = a.orchestrator.perform_sync().await;
    assert_eq!(report.attachments.uploaded, 1);

    let report = b.orchestrator.perform_sync().await;
    assert_eq!(report.attachments.downloaded, 1);
    assert!(b.blobs.ids().contains(&attachment_id));
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_coalesce_into_one_trailing_rerun() {
    quiet_test_logging();
    let remote = Arc::new(MockTransport::new());
    remote.set_fetch_delay(Duration::from_millis(200));
    let r = replica(Arc::clone(&remote), SyncConfig::new());
    r.store
        .mutate(|s| s.insert_task(task("t1", "seed", timestamp(2))));

    let queued_seen = Arc::new(Mutex::new(false));
    let queued_clone = Arc::clone(&queued_seen);
    let _sub = r.orchestrator.subscribe(move |event| {
        if let SyncEvent::StatusChanged { status } = event {
            if status.queued {
                *queued_clone.lock() = true;
            }
        }
    });

    let first = {
        let o = r.orchestrator.clone();
        tokio::spawn(async move { o.perform_sync().await })
    };
    // Let the first cycle get in flight.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let stragglers: Vec<_> = (0..4)
        .map(|_| {
            let o = r.orchestrator.clone();
            tokio::spawn(async move { o.perform_sync().await })
        })
        .collect();

    assert!(first.await.unwrap().success);
    for handle in stragglers {
        // Every caller resolves successfully.
        assert!(handle.await.unwrap().success);
    }

    // One in-flight cycle plus exactly one trailing rerun.
    assert_eq!(remote.fetch_calls(), 2);
    assert!(*queued_seen.lock());
    assert!(!r.orchestrator.status().in_flight);
    assert!(!r.orchestrator.status().queued);
}

#[tokio::test(start_paused = true)]
async fn request_sync_debounces_and_never_drops() {
    quiet_test_logging();
    let remote = Arc::new(MockTransport::new());
    let r = replica(Arc::clone(&remote), SyncConfig::new());
    r.store
        .mutate(|s| s.insert_task(task("t1", "seed", timestamp(2))));

    // A burst of requests coalesces into a single cycle.
    r.orchestrator.request_sync(None);
    r.orchestrator.request_sync(None);
    r.orchestrator.request_sync(None);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(remote.fetch_calls(), 1);

    // A later request still runs, after the minimum spacing.
    r.orchestrator.request_sync(None);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(remote.fetch_calls(), 1);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(remote.fetch_calls(), 2);
}

#[tokio::test]
async fn local_edits_during_a_cycle_survive_to_the_next() {
    quiet_test_logging();
    let remote = Arc::new(MockTransport::new());
    let r = replica(Arc::clone(&remote), SyncConfig::new());
    r.store
        .mutate(|s| s.insert_task(task("t1", "first", timestamp(2))));
    r.orchestrator.perform_sync().await;

    // An edit lands between cycles (the engine holds no lock across the
    // network round trip, so this models a keystroke mid-cycle too).
    r.store
        .mutate(|s| s.insert_task(task("t2", "typed while syncing", timestamp(3))));
    r.orchestrator.perform_sync().await;

    let remote_snapshot = remote.remote_snapshot().unwrap();
    assert!(remote_snapshot.tasks.contains_key("t2"));
}
