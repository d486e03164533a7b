//! Reaction Data Structure

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::channel::ChannelId;
use super::message::{ChatMessage, SyncStatus};

/// A user's reaction on a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub message_id: String,
    pub cid: ChannelId,
    pub user_id: String,
    #[serde(rename = "type")]
    pub reaction_type: String,
    #[serde(default)]
    pub score: u32,
    /// Replace the user's other reactions on the same message
    #[serde(default)]
    pub enforce_unique: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    #[serde(default)]
    pub version: u64,
}

/// Store key for a reaction: one per (message, user, type)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReactionKey {
    pub message_id: String,
    pub user_id: String,
    pub reaction_type: String,
}

impl Reaction {
    pub fn new(message: &ChatMessage, user_id: impl Into<String>, reaction_type: impl Into<String>) -> Self {
        Self {
            message_id: message.id.clone(),
            cid: message.cid.clone(),
            user_id: user_id.into(),
            reaction_type: reaction_type.into(),
            score: 1,
            enforce_unique: false,
            created_at: None,
            deleted_at: None,
            sync_status: SyncStatus::InProgress,
            version: 0,
        }
    }

    pub fn key(&self) -> ReactionKey {
        ReactionKey {
            message_id: self.message_id.clone(),
            user_id: self.user_id.clone(),
            reaction_type: self.reaction_type.clone(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
