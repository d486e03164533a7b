//! Optimistic writes: visibility, validation and no-rollback behaviour

use crate::common::*;
use crate::{assert_err, assert_message_status, assert_ok};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::time::Duration;
use xfchat::local_store::StoreEvent;
use xfchat::offline::{FailurePlan, Operation, OperationKind, OperationResult};
use xfchat::shared::messaging::SyncStatus;
use xfchat::shared::ChatError;

#[tokio::test]
async fn test_optimistic_write_visible_before_remote() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    remote.set_latency(Duration::from_millis(50));
    let mut events = coordinator.subscribe();

    let call = coordinator.submit(Operation::send_message("messaging:general", "hi"));

    let general = cid("messaging:general");
    let state = coordinator.store().read_channel_state(&general).unwrap();
    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].text, "hi");
    assert_eq!(state.messages[0].sync_status, SyncStatus::InProgress);
    assert_matches!(events.try_recv(), Ok(StoreEvent::MessageUpserted(_)));
    assert_eq!(remote.total_calls(), 0);

    let message = assert_ok!(call.execute().await).into_message().unwrap();
    assert_message_status!(coordinator, &general, &message.id, SyncStatus::Synced);
    assert_eq!(remote.calls(OperationKind::SendMessage), 1);
}

#[tokio::test]
async fn test_validation_errors_never_reach_remote() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    let invalid = vec![
        Operation::send_message("no-separator", "hi"),
        Operation::send_message("messaging:general", "   "),
        Operation::send_reaction("messaging:general", "m1", ""),
        Operation::edit_message("messaging:general", "", "text"),
        Operation::mark_read(":missing-type"),
        Operation::SearchMessages {
            cids: Vec::new(),
            query: "hello".to_string(),
            offset: 0,
            limit: 10,
        },
    ];

    for op in invalid {
        let result = coordinator.submit(op).execute().await;
        assert_err!(result, ChatError::Validation { .. });
    }

    assert_eq!(remote.total_calls(), 0);
    assert!(coordinator.store().channel_ids().is_empty());
    assert!(coordinator.pending().is_empty());
    assert_eq!(coordinator.pending().stats().failed_permanent, 0);
}

#[tokio::test]
async fn test_failed_send_is_never_rolled_back() {
    let (coordinator, remote) = coordinator(
        FailurePlan::new().fail_times(OperationKind::SendMessage, 1, ChatError::server(400, "rejected")),
        3,
    );
    let general = cid("messaging:general");

    let result = coordinator
        .submit(Operation::send_message("messaging:general", "keep me"))
        .execute()
        .await;
    assert_err!(result, ChatError::Server { status: 400, .. });
    assert_eq!(remote.calls(OperationKind::SendMessage), 1);

    let state = coordinator.store().read_channel_state(&general).unwrap();
    assert_eq!(state.messages.len(), 1);
    let failed = state.messages[0].clone();
    assert_eq!(failed.text, "keep me");
    assert_eq!(failed.sync_status, SyncStatus::FailedPermanently);

    // user-initiated retry gets a fresh budget
    let retried = assert_ok!(coordinator.retry_message(&general, &failed.id).execute().await);
    let retried = retried.into_message().unwrap();
    assert_eq!(retried.sync_status, SyncStatus::Synced);
    assert_eq!(remote.calls(OperationKind::SendMessage), 2);
}

#[tokio::test]
async fn test_retry_rejected_for_synced_message() {
    let (coordinator, _remote) = coordinator(FailurePlan::new(), 3);
    let general = cid("messaging:general");
    let message = assert_ok!(
        coordinator
            .submit(Operation::send_message("messaging:general", "fine"))
            .execute()
            .await
    )
    .into_message()
    .unwrap();

    let result = coordinator.retry_message(&general, &message.id).execute().await;
    assert_err!(result, ChatError::Validation { .. });
    assert_err!(
        coordinator.discard_message(&general, &message.id),
        ChatError::Validation { .. }
    );
}

#[tokio::test]
async fn test_edit_then_delete_keeps_placeholder() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    let general = cid("messaging:general");
    let message = assert_ok!(
        coordinator
            .submit(Operation::send_message("messaging:general", "draft"))
            .execute()
            .await
    )
    .into_message()
    .unwrap();

    let edited = assert_ok!(
        coordinator
            .submit(Operation::edit_message("messaging:general", &message.id, "final"))
            .execute()
            .await
    )
    .into_message()
    .unwrap();
    assert_eq!(edited.text, "final");
    assert_eq!(remote.calls(OperationKind::EditMessage), 1);

    assert_ok!(
        coordinator
            .submit(Operation::delete_message("messaging:general", &message.id))
            .execute()
            .await
    );
    let stored = coordinator.store().message(&general, &message.id).unwrap();
    assert!(stored.is_deleted());
    assert_eq!(stored.text, "final");
    assert_eq!(stored.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_offline_reads_fail_and_writes_park() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    coordinator.set_online(false).await;

    let watch = coordinator.submit(Operation::watch("messaging:general", 10)).execute().await;
    assert_err!(watch, ChatError::Network { .. });

    let result = assert_ok!(
        coordinator
            .submit(Operation::send_message("messaging:general", "queued"))
            .execute()
            .await
    );
    assert_matches!(result, OperationResult::Message(ref m) if m.sync_status == SyncStatus::SyncNeeded);
    assert_eq!(remote.total_calls(), 0);

    let sweep = coordinator.set_online(true).await;
    assert_eq!(sweep.synced, 1);
    assert_eq!(remote.calls(OperationKind::SendMessage), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_calls_still_reconcile() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    let general = cid("messaging:general");

    for text in ["one", "two", "three"] {
        drop(coordinator.submit(Operation::send_message("messaging:general", text)));
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let state = coordinator.store().read_channel_state(&general).unwrap();
    assert_eq!(state.messages.len(), 3);
    assert!(state.messages.iter().all(|m| m.sync_status == SyncStatus::Synced));
    assert_eq!(remote.calls(OperationKind::SendMessage), 3);
    assert!(coordinator.pending().is_empty());
    assert_eq!(coordinator.cancel_all(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_call_failure_stays_retryable() {
    let (coordinator, remote) = coordinator(
        FailurePlan::new().fail_times(OperationKind::SendMessage, 1, ChatError::server(400, "rejected")),
        3,
    );
    let general = cid("messaging:general");

    drop(coordinator.submit(Operation::send_message("messaging:general", "lost?")));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let failed = coordinator.store().read_channel_state(&general).unwrap().messages[0].clone();
    assert_eq!(failed.sync_status, SyncStatus::FailedPermanently);
    assert!(coordinator.pending().is_empty());
    assert_eq!(coordinator.cancel_all(), 0);

    assert_ok!(coordinator.retry_message(&general, &failed.id).execute().await);
    assert_message_status!(coordinator, &general, &failed.id, SyncStatus::Synced);
    assert_eq!(remote.calls(OperationKind::SendMessage), 2);
}
