//! Real-time Event Types
//!
//! Events pushed by the remote over a live connection. The coordinator folds
//! them into the local store and the watched sessions, see
//! [`crate::offline::events`].
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::messaging::{ChannelId, ChatMessage, Member, Reaction};

/// Event received from the remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A user started typing
    TypingStart {
        cid: ChannelId,
        user_id: String,
        #[serde(default)]
        parent_id: Option<String>,
        received_at: DateTime<Utc>,
    },
    /// A user stopped typing
    TypingStop {
        cid: ChannelId,
        user_id: String,
        #[serde(default)]
        parent_id: Option<String>,
    },
    /// A message was created
    MessageNew { message: ChatMessage },
    /// A message was edited
    MessageUpdated { message: ChatMessage },
    /// A message was deleted
    MessageDeleted {
        cid: ChannelId,
        message_id: String,
        deleted_at: DateTime<Utc>,
    },
    /// A reaction was added
    ReactionNew { reaction: Reaction },
    /// A reaction was removed
    ReactionDeleted { reaction: Reaction },
    /// A user read the channel
    MessageRead {
        cid: ChannelId,
        user_id: String,
        read_at: DateTime<Utc>,
    },
    /// A member joined
    MemberAdded { cid: ChannelId, member: Member },
    /// A member left or was removed
    MemberRemoved { cid: ChannelId, user_id: String },
    /// The channel was deleted
    ChannelDeleted {
        cid: ChannelId,
        deleted_at: DateTime<Utc>,
    },
}

impl ChatEvent {
    /// Channel the event belongs to
    pub fn cid(&self) -> &ChannelId {
        match self {
            ChatEvent::TypingStart { cid, .. }
            | ChatEvent::TypingStop { cid, .. }
            | ChatEvent::MessageDeleted { cid, .. }
            | ChatEvent::MessageRead { cid, .. }
            | ChatEvent::MemberAdded { cid, .. }
            | ChatEvent::MemberRemoved { cid, .. }
            | ChatEvent::ChannelDeleted { cid, .. } => cid,
            ChatEvent::MessageNew { message } | ChatEvent::MessageUpdated { message } => {
                &message.cid
            }
            ChatEvent::ReactionNew { reaction } | ChatEvent::ReactionDeleted { reaction } => {
                &reaction.cid
            }
        }
    }
}
