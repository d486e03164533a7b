//! # Local Store Module
//!
//! The offline cache of channel, message, reaction and read state. Every write
//! is synchronous and atomic for a single entity; there are no cross-entity
//! transactions.
//!
//! ## Architecture
//!
//! State is partitioned per channel. Each entity carries a `version` handed out
//! by [`LocalStore::next_version`]; a write whose version is not newer than the
//! stored one is a no-op, which makes every upsert idempotent.
//!
//! ## Key Components
//!
//! - `LocalStore`: partitions, version clock and the change feed
//! - `messages.rs`: message upsert and soft delete
//! - `reactions.rs`: reaction upsert and soft removal
//! - `channels.rs`: channel records, visibility and read markers
//! - `snapshot.rs`: JSON persistence of the whole store
//!
//! ## Usage
//!
//! ```rust
//! use xfchat::local_store::LocalStore;
//! use xfchat::shared::messaging::{ChannelId, ChatMessage};
//!
//! let store = LocalStore::new();
//! let mut message = ChatMessage::new_text(ChannelId::parse("messaging:1").unwrap(), "alice", "hi");
//! message.version = store.next_version();
//! assert!(store.upsert_message(&message).unwrap());
//! // same payload, same version: no-op
//! assert!(!store.upsert_message(&message).unwrap());
//! ```

pub mod channels;
pub mod messages;
pub mod reactions;
pub mod snapshot;

pub use snapshot::StoreSnapshot;

use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{
    Channel, ChannelId, ChannelRead, ChatMessage, Reaction, ReactionKey, SyncStatus,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Change notification published after every applied write
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    ChannelUpserted(Channel),
    MessageUpserted(ChatMessage),
    MessageDeleted { cid: ChannelId, message_id: String },
    ReactionUpserted(Reaction),
    ReactionRemoved(Reaction),
    ReadUpdated { cid: ChannelId, read: ChannelRead },
}

/// Everything stored for one channel
#[derive(Debug, Default, Clone)]
pub(crate) struct ChannelPartition {
    pub(crate) channel: Option<Channel>,
    pub(crate) messages: HashMap<String, ChatMessage>,
    pub(crate) reactions: HashMap<ReactionKey, Reaction>,
    pub(crate) reads: HashMap<String, ChannelRead>,
}

/// Point-in-time view of one channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub cid: ChannelId,
    pub channel: Option<Channel>,
    /// Ordered by server time (local time while unsynced), unique by id
    pub messages: Vec<ChatMessage>,
    pub reactions: Vec<Reaction>,
    pub reads: Vec<ChannelRead>,
}

impl ChannelSnapshot {
    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn read_for(&self, user_id: &str) -> Option<&ChannelRead> {
        self.reads.iter().find(|r| r.user_id == user_id)
    }
}

/// Shared, synchronous offline cache
#[derive(Debug)]
pub struct LocalStore {
    partitions: RwLock<HashMap<ChannelId, ChannelPartition>>,
    clock: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

impl LocalStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            partitions: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
            events,
        }
    }

    /// Hand out a version newer than any previously issued one
    pub fn next_version(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Subscribe to the change feed
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn check_version(entity: &str, id: &str, version: u64) -> ChatResult<()> {
        if version == 0 {
            return Err(ChatError::store(format!(
                "{} {} has no version; stamp it with next_version()",
                entity, id
            )));
        }
        Ok(())
    }

    fn observe_version(&self, version: u64) {
        self.clock.fetch_max(version, Ordering::SeqCst);
    }

    /// Read a channel's current state
    pub fn read_channel_state(&self, cid: &ChannelId) -> Option<ChannelSnapshot> {
        let partitions = self.partitions.read();
        let partition = partitions.get(cid)?;

        let hide_before = partition
            .channel
            .as_ref()
            .and_then(|c| c.hide_messages_before);

        let mut messages: Vec<ChatMessage> = partition
            .messages
            .values()
            .filter(|m| hide_before.map_or(true, |cutoff| m.sort_time() > cutoff))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.sort_time().cmp(&b.sort_time()).then_with(|| a.id.cmp(&b.id)));

        let mut reactions: Vec<Reaction> = partition.reactions.values().cloned().collect();
        reactions.sort_by(|a, b| a.key().cmp(&b.key()));

        let mut reads: Vec<ChannelRead> = partition.reads.values().cloned().collect();
        reads.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        Some(ChannelSnapshot {
            cid: cid.clone(),
            channel: partition.channel.clone(),
            messages,
            reactions,
            reads,
        })
    }

    /// All channels with any stored state
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.partitions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get store statistics
    pub fn stats(&self) -> StoreStats {
        let partitions = self.partitions.read();
        let mut stats = StoreStats::default();
        for partition in partitions.values() {
            stats.channel_count += 1;
            stats.message_count += partition.messages.len();
            stats.reaction_count += partition.reactions.len();
            stats.pending_sync += partition
                .messages
                .values()
                .filter(|m| m.sync_status.is_pending())
                .count();
            stats.pending_sync += partition
                .reactions
                .values()
                .filter(|r| r.sync_status.is_pending())
                .count();
            stats.failed += partition
                .messages
                .values()
                .filter(|m| m.sync_status == SyncStatus::FailedPermanently)
                .count();
        }
        stats
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Channels with stored state
    pub channel_count: usize,
    /// Messages, including soft-deleted ones
    pub message_count: usize,
    /// Reactions, including soft-removed ones
    pub reaction_count: usize,
    /// Messages and reactions still waiting on the remote
    pub pending_sync: usize,
    /// Messages that failed permanently
    pub failed: usize,
}
