//! # Local Message Operations
//!
//! Message upsert, soft delete and lookup. Deleted messages keep their record
//! with `deleted_at` set so the UI can render a placeholder.

use crate::local_store::{LocalStore, StoreEvent};
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{ChannelId, ChatMessage, SyncStatus};
use chrono::{DateTime, Utc};

impl LocalStore {
    /// Store a message
    ///
    /// Returns `Ok(false)` when the stored copy is already at this version or newer.
    pub fn upsert_message(&self, message: &ChatMessage) -> ChatResult<bool> {
        Self::check_version("message", &message.id, message.version)?;
        {
            let mut partitions = self.partitions.write();
            let partition = partitions.entry(message.cid.clone()).or_default();
            if let Some(existing) = partition.messages.get(&message.id) {
                if existing.version >= message.version {
                    return Ok(false);
                }
            }
            partition.messages.insert(message.id.clone(), message.clone());
        }
        self.observe_version(message.version);
        self.publish(StoreEvent::MessageUpserted(message.clone()));
        Ok(true)
    }

    /// Replace a provisional record with the server's copy under its own id
    ///
    /// Used when the remote assigns a different id than the client generated.
    pub fn rekey_message(&self, provisional_id: &str, message: &ChatMessage) -> ChatResult<bool> {
        if provisional_id == message.id {
            return self.upsert_message(message);
        }
        Self::check_version("message", &message.id, message.version)?;
        let removed = {
            let mut partitions = self.partitions.write();
            let partition = partitions.entry(message.cid.clone()).or_default();
            if let Some(existing) = partition.messages.get(&message.id) {
                if existing.version >= message.version {
                    return Ok(false);
                }
            }
            let removed = partition.messages.remove(provisional_id).is_some();
            partition.messages.insert(message.id.clone(), message.clone());
            removed
        };
        self.observe_version(message.version);
        if removed {
            self.publish(StoreEvent::MessageDeleted {
                cid: message.cid.clone(),
                message_id: provisional_id.to_string(),
            });
        }
        self.publish(StoreEvent::MessageUpserted(message.clone()));
        Ok(true)
    }

    /// Soft delete a message
    pub fn delete_message(
        &self,
        cid: &ChannelId,
        message_id: &str,
        deleted_at: DateTime<Utc>,
        version: u64,
    ) -> ChatResult<bool> {
        Self::check_version("message", message_id, version)?;
        {
            let mut partitions = self.partitions.write();
            let message = partitions
                .get_mut(cid)
                .and_then(|p| p.messages.get_mut(message_id))
                .ok_or_else(|| ChatError::not_found("message", message_id))?;
            if message.version >= version {
                return Ok(false);
            }
            message.deleted_at = Some(deleted_at);
            message.version = version;
        }
        self.observe_version(version);
        self.publish(StoreEvent::MessageDeleted {
            cid: cid.clone(),
            message_id: message_id.to_string(),
        });
        Ok(true)
    }

    /// Get a single message by id
    pub fn message(&self, cid: &ChannelId, message_id: &str) -> Option<ChatMessage> {
        self.partitions
            .read()
            .get(cid)
            .and_then(|p| p.messages.get(message_id))
            .cloned()
    }

    /// Messages in any channel with the given status
    pub fn messages_with_status(&self, status: SyncStatus) -> Vec<ChatMessage> {
        let partitions = self.partitions.read();
        let mut messages: Vec<ChatMessage> = partitions
            .values()
            .flat_map(|p| p.messages.values())
            .filter(|m| m.sync_status == status)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_locally_at);
        messages
    }

    /// Replies to `parent_id`, oldest first
    pub fn thread_messages(&self, cid: &ChannelId, parent_id: &str) -> Vec<ChatMessage> {
        let partitions = self.partitions.read();
        let mut messages: Vec<ChatMessage> = partitions
            .get(cid)
            .map(|p| {
                p.messages
                    .values()
                    .filter(|m| m.parent_id.as_deref() == Some(parent_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        messages.sort_by(|a, b| a.sort_time().cmp(&b.sort_time()).then_with(|| a.id.cmp(&b.id)));
        messages
    }
}
