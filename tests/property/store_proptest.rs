//! Property-based tests for the local store
//!
//! Upserts are idempotent and the highest version always wins, whatever
//! order the writes arrive in.

use proptest::prelude::*;
use xfchat::local_store::LocalStore;
use xfchat::shared::messaging::{ChannelId, ChatMessage};

fn message_at_version(cid: &ChannelId, version: u64) -> ChatMessage {
    let mut message = ChatMessage::new_text(cid.clone(), "alice", format!("v{}", version));
    message.id = "fixed".to_string();
    message.version = version;
    message
}

proptest! {
    #[test]
    fn test_repeated_upsert_is_idempotent(text in ".{1,64}", repeats in 1usize..8) {
        let store = LocalStore::new();
        let cid = ChannelId::parse("messaging:prop").unwrap();
        let mut message = ChatMessage::new_text(cid.clone(), "alice", text);
        message.version = store.next_version();

        prop_assert!(store.upsert_message(&message).unwrap());
        for _ in 0..repeats {
            prop_assert!(!store.upsert_message(&message).unwrap());
        }

        let state = store.read_channel_state(&cid).unwrap();
        prop_assert_eq!(state.messages.len(), 1);
        prop_assert_eq!(&state.messages[0], &message);
    }

    #[test]
    fn test_highest_version_wins(versions in prop::collection::vec(1u64..1_000, 1..20)) {
        let store = LocalStore::new();
        let cid = ChannelId::parse("messaging:prop").unwrap();
        for version in &versions {
            store.upsert_message(&message_at_version(&cid, *version)).unwrap();
        }

        let max = *versions.iter().max().unwrap();
        let stored = store.message(&cid, "fixed").unwrap();
        prop_assert_eq!(stored.version, max);
        prop_assert_eq!(stored.text, format!("v{}", max));
        prop_assert!(store.next_version() > max);
    }
}
