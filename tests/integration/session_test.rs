//! Watching, paging, threads and channel queries

use crate::assert_ok;
use crate::common::*;
use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use xfchat::offline::{ChannelFilter, ChannelSort, FailurePlan, Operation, OperationResult, WatchState};

fn ids(messages: &[xfchat::shared::messaging::ChatMessage]) -> Vec<String> {
    messages.iter().map(|m| m.id.clone()).collect()
}

#[tokio::test]
async fn test_watch_then_load_older_pages() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    seed_channel(&remote, "messaging:history", 5);
    let history = cid("messaging:history");

    let watched = assert_ok!(coordinator.submit(Operation::watch("messaging:history", 2)).execute().await);
    assert_matches!(watched, OperationResult::Channel(ref state) if state.messages.len() == 2);

    let session = coordinator.sessions().session(&history).unwrap();
    assert_eq!(session.state, WatchState::Watching);
    assert_eq!(ids(session.messages()), vec!["history-m3", "history-m4"]);

    let oldest = session.messages()[0].id.clone();
    let page = assert_ok!(
        coordinator
            .submit(Operation::LoadOlderMessages {
                cid: "messaging:history".to_string(),
                parent_id: None,
                before_id: Some(oldest),
                limit: 2,
            })
            .execute()
            .await
    )
    .into_messages()
    .unwrap();
    assert_eq!(ids(&page), vec!["history-m1", "history-m2"]);

    let session = coordinator.sessions().session(&history).unwrap();
    assert_eq!(
        ids(session.messages()),
        vec!["history-m1", "history-m2", "history-m3", "history-m4"]
    );
    assert_eq!(coordinator.store().read_channel_state(&history).unwrap().messages.len(), 4);
}

#[tokio::test]
async fn test_replies_land_only_in_open_threads() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    let seeded = seed_channel(&remote, "messaging:threads", 2);
    let threads = cid("messaging:threads");
    assert_ok!(coordinator.submit(Operation::watch("messaging:threads", 10)).execute().await);

    let open_parent = seeded[1].id.clone();
    let closed_parent = seeded[0].id.clone();

    // an empty first page opens the thread and marks its end
    let page = assert_ok!(
        coordinator
            .submit(Operation::LoadOlderMessages {
                cid: "messaging:threads".to_string(),
                parent_id: Some(open_parent.clone()),
                before_id: None,
                limit: 10,
            })
            .execute()
            .await
    );
    assert_eq!(page, OperationResult::Messages(Vec::new()));

    let open_reply = assert_ok!(
        coordinator
            .submit(Operation::reply("messaging:threads", &open_parent, "in the thread"))
            .execute()
            .await
    )
    .into_message()
    .unwrap();
    let closed_reply = assert_ok!(
        coordinator
            .submit(Operation::reply("messaging:threads", &closed_parent, "elsewhere"))
            .execute()
            .await
    )
    .into_message()
    .unwrap();

    let session = coordinator.sessions().session(&threads).unwrap();
    let thread = session.thread(&open_parent).unwrap();
    assert!(thread.end_reached);
    assert_eq!(ids(thread.messages()), vec![open_reply.id.clone()]);
    assert!(session.thread(&closed_parent).is_none());
    assert!(session.message(&closed_reply.id).is_none());
    assert_eq!(ids(session.messages()), ids(&seeded));

    // both replies are in the store regardless
    assert_eq!(coordinator.store().thread_messages(&threads, &open_parent).len(), 1);
    assert_eq!(coordinator.store().thread_messages(&threads, &closed_parent).len(), 1);
}

#[tokio::test]
async fn test_query_channels_watches_results() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    seed_channel(&remote, "messaging:alpha", 1);
    seed_channel(&remote, "messaging:beta", 1);
    seed_channel(&remote, "team:gamma", 1);

    let result = assert_ok!(
        coordinator
            .submit(Operation::QueryChannels {
                filter: ChannelFilter {
                    channel_type: Some("messaging".to_string()),
                    member: Some(USER.to_string()),
                    include_hidden: false,
                },
                sort: ChannelSort::CreatedAt,
                offset: 0,
                limit: 10,
                message_limit: 5,
            })
            .execute()
            .await
    );
    let OperationResult::Channels(states) = result else {
        panic!("expected channels, got {:?}", result);
    };
    assert_eq!(states.len(), 2);
    assert!(coordinator.sessions().is_watching(&cid("messaging:alpha")));
    assert!(coordinator.sessions().is_watching(&cid("messaging:beta")));
    assert!(!coordinator.sessions().is_watching(&cid("team:gamma")));
}

#[tokio::test]
async fn test_search_and_stop_watching() {
    let (coordinator, remote) = coordinator(FailurePlan::new(), 3);
    seed_channel(&remote, "messaging:search", 3);
    assert_ok!(coordinator.submit(Operation::watch("messaging:search", 10)).execute().await);

    let found = assert_ok!(
        coordinator
            .submit(Operation::SearchMessages {
                cids: vec!["messaging:search".to_string()],
                query: "MESSAGE 2".to_string(),
                offset: 0,
                limit: 10,
            })
            .execute()
            .await
    )
    .into_messages()
    .unwrap();
    assert_eq!(ids(&found), vec!["search-m2"]);

    assert_ok!(
        coordinator
            .submit(Operation::StopWatching {
                cid: "messaging:search".to_string(),
            })
            .execute()
            .await
    );
    assert!(!coordinator.sessions().is_watching(&cid("messaging:search")));
    // stopping a watch keeps the cache
    assert_eq!(
        coordinator
            .store()
            .read_channel_state(&cid("messaging:search"))
            .unwrap()
            .messages
            .len(),
        3
    );
}
