//! Chat Message Data Structure
//!
//! Represents a message in a channel together with its local sync state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::channel::ChannelId;
use super::reaction::Reaction;

/// Lifecycle marker for locally written entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Written locally, remote call in flight
    InProgress,
    /// Written while offline, waiting for a reconnect sweep
    SyncNeeded,
    /// Remote confirmed
    Synced,
    /// Remote refused or retries ran out; still visible
    FailedPermanently,
}

impl SyncStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::InProgress | SyncStatus::SyncNeeded)
    }
}

/// Attachment metadata; upload handling lives outside this crate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: String,
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Represents a chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message id; client-generated until the remote assigns one
    pub id: String,
    pub cid: ChannelId,
    pub user_id: String,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Thread parent, if this is a reply
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Server timestamp; `None` until synced
    pub created_at: Option<DateTime<Utc>>,
    pub created_locally_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_locally_at: Option<DateTime<Utc>>,
    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reaction_counts: HashMap<String, u32>,
    #[serde(default)]
    pub own_reactions: Vec<Reaction>,
    pub sync_status: SyncStatus,
    /// Local write version used for idempotent upserts
    #[serde(default)]
    pub version: u64,
}

impl ChatMessage {
    /// Create a new text message with a provisional id
    pub fn new_text(cid: ChannelId, user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            cid,
            user_id: user_id.into(),
            text: text.into(),
            attachments: Vec::new(),
            parent_id: None,
            created_at: None,
            created_locally_at: Utc::now(),
            updated_at: None,
            updated_locally_at: None,
            deleted_at: None,
            reaction_counts: HashMap::new(),
            own_reactions: Vec::new(),
            sync_status: SyncStatus::InProgress,
            version: 0,
        }
    }

    /// Reply in the thread of `parent_id`
    pub fn in_thread(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Server time when known, local creation time otherwise
    pub fn sort_time(&self) -> DateTime<Utc> {
        self.created_at.unwrap_or(self.created_locally_at)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Get a preview of the message (first N characters)
    pub fn preview(&self, max_len: usize) -> String {
        if self.text.chars().count() <= max_len {
            self.text.clone()
        } else {
            let mut preview: String = self.text.chars().take(max_len.saturating_sub(3)).collect();
            preview.push_str("...");
            preview
        }
    }

    /// Record one of the current user's reactions on this message
    pub fn add_own_reaction(&mut self, reaction: &Reaction, enforce_unique: bool) {
        if enforce_unique {
            for existing in self.own_reactions.drain(..) {
                if let Some(count) = self.reaction_counts.get_mut(&existing.reaction_type) {
                    *count = count.saturating_sub(1);
                }
            }
            self.reaction_counts.retain(|_, count| *count > 0);
        }
        if self
            .own_reactions
            .iter()
            .any(|r| r.reaction_type == reaction.reaction_type)
        {
            return;
        }
        *self
            .reaction_counts
            .entry(reaction.reaction_type.clone())
            .or_insert(0) += 1;
        self.own_reactions.push(reaction.clone());
    }

    /// Drop one of the current user's reactions from this message
    pub fn remove_own_reaction(&mut self, reaction_type: &str) {
        let before = self.own_reactions.len();
        self.own_reactions.retain(|r| r.reaction_type != reaction_type);
        if self.own_reactions.len() < before {
            if let Some(count) = self.reaction_counts.get_mut(reaction_type) {
                *count = count.saturating_sub(1);
            }
            self.reaction_counts.retain(|_, count| *count > 0);
        }
    }
}
