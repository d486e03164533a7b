//! # Local Reaction Operations
//!
//! Reactions are keyed by (message, user, type). Removal is a soft delete so a
//! pending removal can still be retried after a restart.

use crate::local_store::{LocalStore, StoreEvent};
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{ChannelId, Reaction, ReactionKey, SyncStatus};
use chrono::{DateTime, Utc};

impl LocalStore {
    /// Store a reaction
    pub fn upsert_reaction(&self, reaction: &Reaction) -> ChatResult<bool> {
        Self::check_version("reaction", &reaction.reaction_type, reaction.version)?;
        {
            let mut partitions = self.partitions.write();
            let partition = partitions.entry(reaction.cid.clone()).or_default();
            let key = reaction.key();
            if let Some(existing) = partition.reactions.get(&key) {
                if existing.version >= reaction.version {
                    return Ok(false);
                }
            }
            partition.reactions.insert(key, reaction.clone());
        }
        self.observe_version(reaction.version);
        self.publish(StoreEvent::ReactionUpserted(reaction.clone()));
        Ok(true)
    }

    /// Soft delete a reaction
    pub fn remove_reaction(
        &self,
        cid: &ChannelId,
        key: &ReactionKey,
        deleted_at: DateTime<Utc>,
        version: u64,
    ) -> ChatResult<bool> {
        Self::check_version("reaction", &key.reaction_type, version)?;
        let removed = {
            let mut partitions = self.partitions.write();
            let reaction = partitions
                .get_mut(cid)
                .and_then(|p| p.reactions.get_mut(key))
                .ok_or_else(|| ChatError::not_found("reaction", &key.reaction_type))?;
            if reaction.version >= version {
                return Ok(false);
            }
            reaction.deleted_at = Some(deleted_at);
            reaction.version = version;
            reaction.clone()
        };
        self.observe_version(version);
        self.publish(StoreEvent::ReactionRemoved(removed));
        Ok(true)
    }

    /// Get a single reaction
    pub fn reaction(&self, cid: &ChannelId, key: &ReactionKey) -> Option<Reaction> {
        self.partitions
            .read()
            .get(cid)
            .and_then(|p| p.reactions.get(key))
            .cloned()
    }

    /// Live reactions by `user_id` on `message_id`
    pub fn user_reactions(&self, cid: &ChannelId, message_id: &str, user_id: &str) -> Vec<Reaction> {
        self.partitions
            .read()
            .get(cid)
            .map(|p| {
                p.reactions
                    .values()
                    .filter(|r| r.message_id == message_id && r.user_id == user_id && !r.is_deleted())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Reactions in any channel with the given status
    pub fn reactions_with_status(&self, status: SyncStatus) -> Vec<Reaction> {
        let partitions = self.partitions.read();
        let mut reactions: Vec<Reaction> = partitions
            .values()
            .flat_map(|p| p.reactions.values())
            .filter(|r| r.sync_status == status)
            .cloned()
            .collect();
        reactions.sort_by_key(|r| r.version);
        reactions
    }
}
