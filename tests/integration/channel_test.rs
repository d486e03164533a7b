//! Channel lifecycle: create, hide, show, leave, delete

use crate::common::*;
use crate::{assert_err, assert_ok};
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use xfchat::offline::{FailurePlan, Operation, OperationKind, OperationResult};
use xfchat::shared::messaging::{ReactionKey, SyncStatus};
use xfchat::shared::ChatError;

#[tokio::test]
async fn test_create_channel_is_watched_and_synced() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    let crew = cid("team:crew");

    let call = coordinator.submit(Operation::create_channel(
        "team:crew",
        vec!["bob".to_string(), "bob".to_string(), USER.to_string()],
    ));
    let optimistic = coordinator.store().channel(&crew).unwrap();
    assert_eq!(optimistic.sync_status, SyncStatus::InProgress);
    assert_eq!(optimistic.members.len(), 2);
    assert!(coordinator.sessions().is_watching(&crew));

    let result = assert_ok!(call.execute().await);
    assert_matches!(result, OperationResult::Channel(ref state) if state.channel.created_at.is_some());
    assert_eq!(coordinator.store().channel(&crew).unwrap().sync_status, SyncStatus::Synced);
    assert_eq!(remote.calls(OperationKind::CreateChannel), 1);
}

#[tokio::test]
async fn test_hide_then_show() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    seed_channel(&remote, "messaging:quiet", 2);
    let quiet = cid("messaging:quiet");
    assert_ok!(coordinator.submit(Operation::watch("messaging:quiet", 10)).execute().await);

    assert_ok!(
        coordinator
            .submit(Operation::HideChannel {
                cid: "messaging:quiet".to_string(),
                clear_history: false,
            })
            .execute()
            .await
    );
    let hidden = coordinator.store().channel(&quiet).unwrap();
    assert!(hidden.hidden);
    assert_eq!(hidden.sync_status, SyncStatus::Synced);
    assert!(coordinator.sessions().session(&quiet).unwrap().hidden);
    // without clear_history the messages stay readable
    assert_eq!(coordinator.store().read_channel_state(&quiet).unwrap().messages.len(), 2);

    assert_ok!(
        coordinator
            .submit(Operation::ShowChannel {
                cid: "messaging:quiet".to_string(),
            })
            .execute()
            .await
    );
    assert!(!coordinator.store().channel(&quiet).unwrap().hidden);
    assert!(!coordinator.sessions().session(&quiet).unwrap().hidden);
}

#[tokio::test]
async fn test_hide_unknown_channel_is_not_found() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    let result = coordinator
        .submit(Operation::HideChannel {
            cid: "messaging:nowhere".to_string(),
            clear_history: true,
        })
        .execute()
        .await;
    assert_err!(result, ChatError::NotFound { .. });
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn test_leave_channel_drops_membership_and_session() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    seed_channel(&remote, "messaging:club", 1);
    let club = cid("messaging:club");
    assert_ok!(coordinator.submit(Operation::watch("messaging:club", 10)).execute().await);

    assert_ok!(
        coordinator
            .submit(Operation::LeaveChannel {
                cid: "messaging:club".to_string(),
            })
            .execute()
            .await
    );
    let channel = coordinator.store().channel(&club).unwrap();
    assert!(channel.members.iter().all(|m| m.user_id != USER));
    assert!(!coordinator.sessions().is_watching(&club));
}

#[tokio::test]
async fn test_delete_channel_is_soft() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    seed_channel(&remote, "messaging:gone", 2);
    let gone = cid("messaging:gone");
    assert_ok!(coordinator.submit(Operation::watch("messaging:gone", 10)).execute().await);

    assert_ok!(
        coordinator
            .submit(Operation::DeleteChannel {
                cid: "messaging:gone".to_string(),
            })
            .execute()
            .await
    );
    let channel = coordinator.store().channel(&gone).unwrap();
    assert!(channel.is_deleted());
    assert!(!coordinator.sessions().is_watching(&gone));
    assert_eq!(coordinator.store().read_channel_state(&gone).unwrap().messages.len(), 2);
}

#[tokio::test]
async fn test_delete_reaction_round_trip() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    let general = cid("messaging:general");
    let message = assert_ok!(
        coordinator
            .submit(Operation::send_message("messaging:general", "thumbs"))
            .execute()
            .await
    )
    .into_message()
    .unwrap();
    assert_ok!(
        coordinator
            .submit(Operation::send_reaction("messaging:general", &message.id, "up"))
            .execute()
            .await
    );

    let reaction = assert_ok!(
        coordinator
            .submit(Operation::delete_reaction("messaging:general", &message.id, "up"))
            .execute()
            .await
    )
    .into_reaction()
    .unwrap();
    assert!(reaction.is_deleted());
    assert_eq!(remote.calls(OperationKind::DeleteReaction), 1);

    let key = ReactionKey {
        message_id: message.id.clone(),
        user_id: USER.to_string(),
        reaction_type: "up".to_string(),
    };
    assert!(coordinator.store().reaction(&general, &key).unwrap().is_deleted());
    assert!(coordinator
        .store()
        .message(&general, &message.id)
        .unwrap()
        .own_reactions
        .is_empty());

    // a second delete has nothing left to remove
    let again = coordinator
        .submit(Operation::delete_reaction("messaging:general", &message.id, "up"))
        .execute()
        .await;
    assert_err!(again, ChatError::NotFound { .. });
}
