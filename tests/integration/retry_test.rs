//! Retry budget and backoff, on paused time

use crate::common::*;
use crate::{assert_err, assert_message_status, assert_ok};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::time::Instant;
use xfchat::offline::{FailurePlan, Operation, OperationKind};
use xfchat::shared::messaging::{ReactionKey, SyncStatus};
use xfchat::shared::ChatError;

#[tokio::test(start_paused = true)]
async fn test_retry_budget_is_exhausted_exactly() {
    let (coordinator, remote) = coordinator(
        FailurePlan::new().fail_always(OperationKind::SendMessage, ChatError::network("connection reset")),
        4,
    );
    let general = cid("messaging:general");

    let started = Instant::now();
    let call = coordinator.submit(Operation::send_message("messaging:general", "doomed"));
    let message_id = coordinator.store().read_channel_state(&general).unwrap().messages[0]
        .id
        .clone();

    let result = call.execute().await;
    assert_err!(result, ChatError::Network { .. });

    // 100ms + 200ms + 400ms between four attempts
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(700), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1_500), "elapsed {:?}", elapsed);

    assert_eq!(remote.calls(OperationKind::SendMessage), 4);
    assert_message_status!(coordinator, &general, &message_id, SyncStatus::FailedPermanently);

    let stats = coordinator.pending().stats();
    assert_eq!(stats.in_flight, 0);
    assert_eq!(stats.failed_permanent, 1);
}

#[tokio::test(start_paused = true)]
async fn test_reaction_succeeds_after_one_retry() {
    let (coordinator, remote) = coordinator(
        FailurePlan::new().fail_times(OperationKind::SendReaction, 1, ChatError::server(503, "unavailable")),
        3,
    );
    let general = cid("messaging:general");
    let message = assert_ok!(
        coordinator
            .submit(Operation::send_message("messaging:general", "react to me"))
            .execute()
            .await
    )
    .into_message()
    .unwrap();

    let call = coordinator.submit(Operation::send_reaction("messaging:general", &message.id, "like"));
    let key = ReactionKey {
        message_id: message.id.clone(),
        user_id: USER.to_string(),
        reaction_type: "like".to_string(),
    };
    let optimistic = coordinator.store().reaction(&general, &key).unwrap();
    assert_eq!(optimistic.sync_status, SyncStatus::InProgress);

    let reaction = assert_ok!(call.execute().await).into_reaction().unwrap();
    assert_eq!(reaction.sync_status, SyncStatus::Synced);
    assert_eq!(remote.calls(OperationKind::SendReaction), 2);
    assert_eq!(
        coordinator.store().reaction(&general, &key).unwrap().sync_status,
        SyncStatus::Synced
    );
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_is_not_retried() {
    let (coordinator, remote) = coordinator(
        FailurePlan::new().fail_always(OperationKind::SendMessage, ChatError::auth("token expired")),
        5,
    );

    let started = Instant::now();
    let result = coordinator
        .submit(Operation::send_message("messaging:general", "nope"))
        .execute()
        .await;

    assert_err!(result, ChatError::Auth { .. });
    assert_eq!(remote.calls(OperationKind::SendMessage), 1);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_stops_pending_retries() {
    let (coordinator, remote) = coordinator(
        FailurePlan::new().fail_always(OperationKind::SendMessage, ChatError::network("down")),
        5,
    );

    let first = coordinator.submit(Operation::send_message("messaging:general", "one"));
    let second = coordinator.submit(Operation::send_message("messaging:general", "two"));
    let first = tokio::spawn(async move { first.execute().await });
    let second = tokio::spawn(async move { second.execute().await });

    // let both make their first attempt and start waiting
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(remote.calls(OperationKind::SendMessage), 2);
    assert_eq!(coordinator.cancel_all(), 2);

    assert_err!(first.await.unwrap(), ChatError::Cancelled);
    assert_err!(second.await.unwrap(), ChatError::Cancelled);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(remote.calls(OperationKind::SendMessage), 2);
}
