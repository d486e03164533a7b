//! Mark-all-read: local fan-out over watched channels, one remote call

use crate::common::*;
use crate::{assert_err, assert_ok};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xfchat::offline::{Coordinator, FailurePlan, LoopbackRemote, Operation, OperationKind, OperationResult};
use xfchat::shared::ChatError;

const CHANNELS: [&str; 3] = ["messaging:one", "messaging:two", "messaging:three"];

async fn watch_seeded(coordinator: &Coordinator, remote: &LoopbackRemote) {
    for raw in CHANNELS {
        seed_channel(remote, raw, 3);
        assert_ok!(coordinator.submit(Operation::watch(raw, 10)).execute().await);
    }
}

fn channels_read_by_user(coordinator: &Coordinator) -> usize {
    CHANNELS
        .iter()
        .filter(|raw| {
            coordinator
                .store()
                .read_channel_state(&cid(raw))
                .map_or(false, |state| state.read_for(USER).is_some())
        })
        .count()
}

#[tokio::test]
async fn test_local_reads_precede_the_remote_call() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    watch_seeded(&coordinator, &remote).await;
    assert_eq!(channels_read_by_user(&coordinator), 0);

    let store = coordinator.store().clone();
    let seen_at_remote = Arc::new(AtomicUsize::new(usize::MAX));
    let seen = seen_at_remote.clone();
    remote.set_observer(move |kind| {
        if kind == OperationKind::MarkAllRead {
            let read = CHANNELS
                .iter()
                .filter(|raw| {
                    store
                        .read_channel_state(&cid(raw))
                        .map_or(false, |state| state.read_for(USER).is_some())
                })
                .count();
            seen.store(read, Ordering::SeqCst);
        }
    });

    let result = assert_ok!(coordinator.submit(Operation::MarkAllRead).execute().await);
    assert_eq!(result, OperationResult::MarkedAllRead { channels: 3 });
    assert_eq!(seen_at_remote.load(Ordering::SeqCst), 3);
    assert_eq!(remote.calls(OperationKind::MarkAllRead), 1);
    assert_eq!(remote.calls(OperationKind::MarkRead), 0);
}

#[tokio::test]
async fn test_second_mark_all_read_changes_nothing() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    watch_seeded(&coordinator, &remote).await;

    assert_ok!(coordinator.submit(Operation::MarkAllRead).execute().await);
    let again = assert_ok!(coordinator.submit(Operation::MarkAllRead).execute().await);

    assert_matches!(again, OperationResult::MarkedAllRead { channels: 0 });
    assert_eq!(remote.calls(OperationKind::MarkAllRead), 2);
}

#[tokio::test]
async fn test_remote_failure_keeps_local_reads() {
    let (coordinator, remote) = coordinator(
        FailurePlan::new().fail_always(OperationKind::MarkAllRead, ChatError::server(400, "bad request")),
        3,
    );
    watch_seeded(&coordinator, &remote).await;

    let result = coordinator.submit(Operation::MarkAllRead).execute().await;
    assert_err!(result, ChatError::Server { status: 400, .. });
    assert_eq!(channels_read_by_user(&coordinator), 3);
}

#[tokio::test]
async fn test_offline_mark_all_read_is_local_only() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    watch_seeded(&coordinator, &remote).await;
    coordinator.set_online(false).await;

    let result = assert_ok!(coordinator.submit(Operation::MarkAllRead).execute().await);
    assert_eq!(result, OperationResult::MarkedAllRead { channels: 3 });
    assert_eq!(remote.calls(OperationKind::MarkAllRead), 0);
    assert!(coordinator.pending().is_empty());
}
