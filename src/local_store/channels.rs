//! # Local Channel Operations
//!
//! Channel records, hidden state and per-user read markers.

use crate::local_store::{LocalStore, StoreEvent};
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{Channel, ChannelId, ChannelRead, SyncStatus};
use chrono::{DateTime, Utc};

impl LocalStore {
    /// Store a channel record
    pub fn upsert_channel(&self, channel: &Channel) -> ChatResult<bool> {
        Self::check_version("channel", &channel.cid.to_string(), channel.version)?;
        {
            let mut partitions = self.partitions.write();
            let partition = partitions.entry(channel.cid.clone()).or_default();
            if let Some(existing) = &partition.channel {
                if existing.version >= channel.version {
                    return Ok(false);
                }
            }
            partition.channel = Some(channel.clone());
        }
        self.observe_version(channel.version);
        self.publish(StoreEvent::ChannelUpserted(channel.clone()));
        Ok(true)
    }

    /// Get a channel record
    pub fn channel(&self, cid: &ChannelId) -> Option<Channel> {
        self.partitions
            .read()
            .get(cid)
            .and_then(|p| p.channel.clone())
    }

    /// Channels with the given status
    pub fn channels_with_status(&self, status: SyncStatus) -> Vec<Channel> {
        let partitions = self.partitions.read();
        let mut channels: Vec<Channel> = partitions
            .values()
            .filter_map(|p| p.channel.as_ref())
            .filter(|c| c.sync_status == status)
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.cid.cmp(&b.cid));
        channels
    }

    /// Update visibility; `clear_before` hides older history from snapshots
    pub fn set_hidden(
        &self,
        cid: &ChannelId,
        hidden: bool,
        clear_before: Option<DateTime<Utc>>,
        version: u64,
    ) -> ChatResult<bool> {
        let mut channel = self
            .channel(cid)
            .ok_or_else(|| ChatError::not_found("channel", cid.to_string()))?;
        channel.hidden = hidden;
        if clear_before.is_some() {
            channel.hide_messages_before = clear_before;
        }
        channel.version = version;
        self.upsert_channel(&channel)
    }

    /// Soft delete the channel record; messages stay for placeholders
    pub fn delete_channel(
        &self,
        cid: &ChannelId,
        deleted_at: DateTime<Utc>,
        version: u64,
    ) -> ChatResult<bool> {
        let mut channel = self
            .channel(cid)
            .ok_or_else(|| ChatError::not_found("channel", cid.to_string()))?;
        channel.deleted_at = Some(deleted_at);
        channel.version = version;
        self.upsert_channel(&channel)
    }

    /// Record that `user_id` read the channel up to `last_read`
    ///
    /// Read markers only move forward.
    pub fn upsert_read(&self, cid: &ChannelId, read: &ChannelRead) -> ChatResult<bool> {
        Self::check_version("read", &read.user_id, read.version)?;
        {
            let mut partitions = self.partitions.write();
            let partition = partitions.entry(cid.clone()).or_default();
            if let Some(existing) = partition.reads.get(&read.user_id) {
                if existing.version >= read.version || existing.last_read > read.last_read {
                    return Ok(false);
                }
            }
            partition.reads.insert(read.user_id.clone(), read.clone());
        }
        self.observe_version(read.version);
        self.publish(StoreEvent::ReadUpdated {
            cid: cid.clone(),
            read: read.clone(),
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid() -> ChannelId {
        ChannelId::parse("messaging:general").unwrap()
    }

    #[test]
    fn test_upsert_channel_idempotent() {
        let store = LocalStore::new();
        let mut channel = Channel::new(cid(), "alice");
        channel.version = store.next_version();
        assert!(store.upsert_channel(&channel).unwrap());
        assert!(!store.upsert_channel(&channel).unwrap());
        assert_eq!(store.channel(&cid()).unwrap().created_by, "alice");
    }

    #[test]
    fn test_set_hidden_requires_channel() {
        let store = LocalStore::new();
        let version = store.next_version();
        let result = store.set_hidden(&cid(), true, None, version);
        assert!(matches!(result, Err(ChatError::NotFound { .. })));
    }

    #[test]
    fn test_hide_with_clear_history() {
        let store = LocalStore::new();
        let mut channel = Channel::new(cid(), "alice");
        channel.version = store.next_version();
        store.upsert_channel(&channel).unwrap();

        let mut old = crate::shared::messaging::ChatMessage::new_text(cid(), "bob", "old");
        old.created_at = Some(Utc::now() - chrono::Duration::hours(1));
        old.version = store.next_version();
        store.upsert_message(&old).unwrap();

        let version = store.next_version();
        store.set_hidden(&cid(), true, Some(Utc::now()), version).unwrap();

        let state = store.read_channel_state(&cid()).unwrap();
        assert!(state.channel.unwrap().hidden);
        assert!(state.messages.is_empty());
        assert!(store.message(&cid(), &old.id).is_some());
    }

    #[test]
    fn test_delete_channel_is_soft() {
        let store = LocalStore::new();
        let mut channel = Channel::new(cid(), "alice");
        channel.version = store.next_version();
        store.upsert_channel(&channel).unwrap();

        let version = store.next_version();
        assert!(store.delete_channel(&cid(), Utc::now(), version).unwrap());
        assert!(store.channel(&cid()).unwrap().is_deleted());
    }

    #[test]
    fn test_read_marker_moves_forward_only() {
        let store = LocalStore::new();
        let now = Utc::now();
        let newer = ChannelRead {
            user_id: "alice".to_string(),
            last_read: now,
            version: store.next_version(),
        };
        let older = ChannelRead {
            user_id: "alice".to_string(),
            last_read: now - chrono::Duration::minutes(1),
            version: store.next_version(),
        };

        assert!(store.upsert_read(&cid(), &newer).unwrap());
        assert!(!store.upsert_read(&cid(), &older).unwrap());

        let state = store.read_channel_state(&cid()).unwrap();
        assert_eq!(state.read_for("alice").unwrap().last_read, now);
    }
}
