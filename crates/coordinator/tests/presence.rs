//! Integration tests for presence tracking.
//!
//! Uses paused tokio time so the in-memory store's TTL eviction can be
//! driven deterministically.

mod common;

use std::sync::Arc;
use std::time::Duration;

use concord_coordinator::background::presence_sweep::sweep;
use concord_coordinator::PresenceTracker;
use concord_core::collaboration::{Notification, PresenceMode, PresenceStatus};
use concord_store::{Keyspace, KvStore, MemoryStore};

use common::{memory_coordinator, HookStore, Trigger};

/// Default stale threshold from the test config.
const STALE: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Test: join is idempotent
// ---------------------------------------------------------------------------

#[tokio::test]
async fn attaching_twice_keeps_one_record() {
    let (coordinator, _) = memory_coordinator();

    let first = coordinator
        .attach("alice", "doc-1", PresenceMode::Viewer, None)
        .await
        .unwrap();
    let second = coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();

    assert_eq!(second.presence.joined_at, first.presence.joined_at);
    assert_eq!(second.all_presence.len(), 1);
    assert_eq!(second.all_presence[0].mode, PresenceMode::Editor);
}

// ---------------------------------------------------------------------------
// Test: heartbeat never resurrects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_after_detach_is_noop() {
    let (coordinator, _) = memory_coordinator();
    coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();
    coordinator.detach("alice", "doc-1").await.unwrap();

    assert_eq!(coordinator.heartbeat("alice", "doc-1").await.unwrap(), None);
    assert!(coordinator.list_presence("doc-1").await.unwrap().is_empty());
    assert_eq!(coordinator.metrics().heartbeats_ignored, 1);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_after_expiry_is_noop() {
    let (coordinator, store) = memory_coordinator();
    coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();

    tokio::time::advance(STALE + Duration::from_secs(1)).await;

    assert_eq!(coordinator.heartbeat("alice", "doc-1").await.unwrap(), None);
    assert!(coordinator.list_presence("doc-1").await.unwrap().is_empty());

    let index = Keyspace::default().presence_index("doc-1");
    assert!(store.set_members(&index).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn heartbeats_keep_presence_alive() {
    let (coordinator, _) = memory_coordinator();
    let attached = coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();

    for _ in 0..3 {
        tokio::time::advance(STALE - Duration::from_secs(20)).await;
        let record = coordinator.heartbeat("alice", "doc-1").await.unwrap();
        assert!(record.is_some(), "heartbeat inside the window must refresh");
    }

    let listed = coordinator.list_presence("doc-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].joined_at, attached.presence.joined_at);
    assert_eq!(coordinator.metrics().heartbeats, 3);
}

// ---------------------------------------------------------------------------
// Test: status updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_change_is_broadcast_and_keeps_join_time() {
    let (coordinator, _) = memory_coordinator();
    let attached = coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();

    let notified = coordinator
        .update_status("alice", "doc-1", PresenceStatus::Away)
        .await
        .unwrap()
        .expect("alice is attached");

    assert_eq!(notified.value.status, PresenceStatus::Away);
    assert_eq!(notified.value.joined_at, attached.presence.joined_at);
    assert_eq!(
        notified.notification,
        Notification::StatusChanged {
            resource_id: "doc-1".into(),
            actor_id: "alice".into(),
            status: PresenceStatus::Away,
        }
    );
}

#[tokio::test]
async fn status_change_for_absent_actor_returns_none() {
    let (coordinator, _) = memory_coordinator();
    let result = coordinator
        .update_status("ghost", "doc-1", PresenceStatus::Offline)
        .await
        .unwrap();
    assert!(result.is_none());
}

// ---------------------------------------------------------------------------
// Test: membership index drift
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_index_entry_is_dropped_on_read() {
    let (coordinator, store) = memory_coordinator();
    let keys = Keyspace::default();
    coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();

    // An index entry whose record is gone.
    store
        .set_add(&keys.presence_index("doc-1"), "ghost")
        .await
        .unwrap();

    let listed = coordinator.list_presence("doc-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].actor_id, "alice");

    let members = store
        .set_members(&keys.presence_index("doc-1"))
        .await
        .unwrap();
    assert_eq!(members, vec!["alice".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn sweep_prunes_expired_members_and_untracks_empty_resources() {
    let (coordinator, store) = memory_coordinator();
    let keys = Keyspace::default();

    coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();
    coordinator
        .attach("bob", "doc-2", PresenceMode::Viewer, None)
        .await
        .unwrap();

    tokio::time::advance(STALE / 2).await;
    coordinator.heartbeat("bob", "doc-2").await.unwrap();
    tokio::time::advance(STALE / 2 + Duration::from_secs(1)).await;

    let dropped = sweep(coordinator.presence()).await.unwrap();
    assert_eq!(dropped, 1);

    let tracked = store.set_members(&keys.presence_resources()).await.unwrap();
    assert_eq!(tracked, vec!["doc-2".to_string()]);
    assert_eq!(coordinator.list_presence("doc-2").await.unwrap().len(), 1);
}

/// A tracker over `memory` directly and one whose store runs injected
/// actions mid-call.
fn trackers(memory: &Arc<MemoryStore>) -> (PresenceTracker, PresenceTracker, Arc<HookStore>) {
    let hooked = Arc::new(HookStore::new(memory.clone()));
    let plain = PresenceTracker::new(memory.clone(), Keyspace::default(), STALE);
    let interleaved = PresenceTracker::new(hooked.clone(), Keyspace::default(), STALE);
    (plain, interleaved, hooked)
}

#[tokio::test(start_paused = true)]
async fn rejoin_while_stale_entry_is_dropped_stays_listed() {
    let memory = Arc::new(MemoryStore::new());
    let keys = Keyspace::default();
    let (plain, reader, hooked) = trackers(&memory);

    plain
        .join("u1", "r1", PresenceMode::Editor, None)
        .await
        .unwrap();
    tokio::time::advance(STALE + Duration::from_secs(1)).await;

    // u1 rejoins after the reader saw the record missing but before it
    // removes the index entry.
    let rejoin = plain.clone();
    hooked.on(Trigger::GetMiss(keys.presence("r1", "u1")), async move {
        rejoin
            .join("u1", "r1", PresenceMode::Editor, None)
            .await
            .unwrap();
    });

    let listed = reader.list("r1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].actor_id, "u1");

    for _ in 0..3 {
        assert!(plain.heartbeat("u1", "r1").await.unwrap().is_some());
        let listed = plain.list("r1").await.unwrap();
        assert_eq!(listed.len(), 1, "a live actor must stay listed");
    }
    let members = memory.set_members(&keys.presence_index("r1")).await.unwrap();
    assert_eq!(members, vec!["u1".to_string()]);
}

#[tokio::test]
async fn heartbeat_restores_missing_index_entry() {
    let memory = Arc::new(MemoryStore::new());
    let keys = Keyspace::default();
    let (plain, _, _) = trackers(&memory);

    plain
        .join("u1", "r1", PresenceMode::Viewer, None)
        .await
        .unwrap();
    memory
        .set_remove(&keys.presence_index("r1"), "u1")
        .await
        .unwrap();
    assert!(plain.list("r1").await.unwrap().is_empty());

    assert!(plain.heartbeat("u1", "r1").await.unwrap().is_some());
    let listed = plain.list("r1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].actor_id, "u1");
}

#[tokio::test]
async fn contended_rejoin_keeps_join_time() {
    let memory = Arc::new(MemoryStore::new());
    let (plain, contended, hooked) = trackers(&memory);

    let first = plain
        .join("alice", "doc-1", PresenceMode::Viewer, None)
        .await
        .unwrap();

    hooked.lose_cas();
    let second = contended
        .join("alice", "doc-1", PresenceMode::Editor, None)
        .await
        .unwrap();
    assert_eq!(second.joined_at, first.joined_at);
    assert_eq!(second.mode, PresenceMode::Editor);

    let listed = plain.list("doc-1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].joined_at, first.joined_at);
    assert_eq!(listed[0].mode, PresenceMode::Editor);
}

#[tokio::test]
async fn join_during_prune_keeps_resource_tracked() {
    let memory = Arc::new(MemoryStore::new());
    let keys = Keyspace::default();
    let (plain, pruner, hooked) = trackers(&memory);

    // u1 joins after the prune found the index empty but before it
    // untracks the resource.
    let join = plain.clone();
    hooked.on(Trigger::SetRemove(keys.presence_resources()), async move {
        join.join("u1", "r1", PresenceMode::Editor, None)
            .await
            .unwrap();
    });

    assert_eq!(pruner.prune("r1").await.unwrap(), 0);

    let tracked = plain.tracked_resources().await.unwrap();
    assert_eq!(tracked, vec!["r1".to_string()]);
    assert_eq!(plain.list("r1").await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: metadata round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metadata_is_returned_with_presence() {
    let (coordinator, _) = memory_coordinator();
    let mut metadata = concord_store::models::PresenceMetadata::new();
    metadata.insert("display_name".into(), serde_json::json!("Alice"));

    let snapshot = coordinator
        .attach("alice", "doc-1", PresenceMode::Editor, Some(metadata.clone()))
        .await
        .unwrap();

    assert_eq!(snapshot.presence.metadata, Some(metadata.clone()));
    assert_eq!(snapshot.all_presence[0].metadata, Some(metadata));
}
