//! # Store Snapshots
//!
//! Serializes the whole store to JSON so pending work survives a restart.
//! Loading a snapshot advances the version clock past every stored version.

use crate::local_store::{ChannelPartition, LocalStore};
use crate::shared::error::ChatResult;
use crate::shared::messaging::{Channel, ChannelId, ChannelRead, ChatMessage, Reaction};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::Ordering;

/// Serializable image of a `LocalStore`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub clock: u64,
    pub channels: Vec<Channel>,
    pub messages: Vec<ChatMessage>,
    pub reactions: Vec<Reaction>,
    pub reads: Vec<ReadRecord>,
}

/// Read marker with its channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadRecord {
    pub cid: ChannelId,
    #[serde(flatten)]
    pub read: ChannelRead,
}

impl LocalStore {
    /// Capture the current contents
    pub fn snapshot(&self) -> StoreSnapshot {
        let partitions = self.partitions.read();
        let mut snapshot = StoreSnapshot {
            clock: self.clock.load(Ordering::SeqCst),
            ..StoreSnapshot::default()
        };
        for (cid, partition) in partitions.iter() {
            snapshot.channels.extend(partition.channel.iter().cloned());
            snapshot.messages.extend(partition.messages.values().cloned());
            snapshot.reactions.extend(partition.reactions.values().cloned());
            snapshot.reads.extend(partition.reads.values().map(|read| ReadRecord {
                cid: cid.clone(),
                read: read.clone(),
            }));
        }
        snapshot.channels.sort_by(|a, b| a.cid.cmp(&b.cid));
        snapshot.messages.sort_by_key(|m| m.version);
        snapshot.reactions.sort_by_key(|r| r.version);
        snapshot.reads.sort_by_key(|r| r.read.version);
        snapshot
    }

    /// Build a store from a snapshot
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let store = LocalStore::new();
        let mut max_version = snapshot.clock;
        {
            let mut partitions: HashMap<ChannelId, ChannelPartition> = HashMap::new();
            for channel in snapshot.channels {
                max_version = max_version.max(channel.version);
                let cid = channel.cid.clone();
                partitions.entry(cid).or_default().channel = Some(channel);
            }
            for message in snapshot.messages {
                max_version = max_version.max(message.version);
                partitions
                    .entry(message.cid.clone())
                    .or_default()
                    .messages
                    .insert(message.id.clone(), message);
            }
            for reaction in snapshot.reactions {
                max_version = max_version.max(reaction.version);
                partitions
                    .entry(reaction.cid.clone())
                    .or_default()
                    .reactions
                    .insert(reaction.key(), reaction);
            }
            for record in snapshot.reads {
                max_version = max_version.max(record.read.version);
                partitions
                    .entry(record.cid)
                    .or_default()
                    .reads
                    .insert(record.read.user_id.clone(), record.read);
            }
            *store.partitions.write() = partitions;
        }
        store.clock.store(max_version, Ordering::SeqCst);
        store
    }

    /// Write the snapshot as JSON, creating parent directories
    pub fn save_to(&self, path: impl AsRef<Path>) -> ChatResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), "saved local store snapshot");
        Ok(())
    }

    /// Load a snapshot written by [`LocalStore::save_to`]; a missing file yields an empty store
    pub fn load_from(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(LocalStore::new());
        }
        let bytes = std::fs::read(path)?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            path = %path.display(),
            messages = snapshot.messages.len(),
            "loaded local store snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::messaging::SyncStatus;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = LocalStore::new();
        let cid = ChannelId::parse("messaging:1").unwrap();
        let mut message = ChatMessage::new_text(cid.clone(), "alice", "persist me");
        message.sync_status = SyncStatus::SyncNeeded;
        message.version = store.next_version();
        store.upsert_message(&message).unwrap();
        store.save_to(&path).unwrap();

        let loaded = LocalStore::load_from(&path).unwrap();
        assert_eq!(loaded.snapshot(), store.snapshot());
        assert_eq!(loaded.messages_with_status(SyncStatus::SyncNeeded).len(), 1);
        assert!(loaded.next_version() > message.version);
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::load_from(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.stats().message_count, 0);
    }
}
