//! # State Reconciliation
//!
//! Folds remote outcomes back into the local store. A confirmed mutation is
//! overwritten by the server copy and marked `Synced`; a failed one is marked
//! `FailedPermanently` and left in place. Server state loaded by watch, query
//! and pagination never overwrites a record that still has a local mutation
//! pending.
//!
//! ## Reconnect Sweep
//!
//! [`CoordinatorInner::retry_failed_entities`] pushes every `SyncNeeded`
//! channel, message and reaction once, in that order. Transient failures stay
//! `SyncNeeded` for the next sweep; permanent ones become `FailedPermanently`.

use crate::offline::coordinator::CoordinatorInner;
use crate::offline::operation::OperationKind;
use crate::offline::remote::ChannelState;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{Channel, ChannelId, ChatMessage, Reaction, SyncStatus};
use tracing::{debug, info, warn};

/// Remote call that brings a locally written message in line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageSync {
    Send,
    Update,
    Delete,
}

impl MessageSync {
    /// Derive the remote call from the message's local timestamps
    pub(crate) fn for_message(message: &ChatMessage) -> Self {
        if message.deleted_at.is_some() {
            MessageSync::Delete
        } else if message.created_at.is_some() && message.updated_locally_at.is_some() {
            MessageSync::Update
        } else {
            MessageSync::Send
        }
    }

    pub(crate) fn kind(&self) -> OperationKind {
        match self {
            MessageSync::Send => OperationKind::SendMessage,
            MessageSync::Update => OperationKind::EditMessage,
            MessageSync::Delete => OperationKind::DeleteMessage,
        }
    }
}

/// Outcome of a reconnect sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrySweep {
    /// Entities the remote confirmed
    pub synced: usize,
    /// Entities the remote refused, now `FailedPermanently`
    pub failed: usize,
    /// Entities still `SyncNeeded` after a transient failure
    pub remaining: usize,
}

impl RetrySweep {
    fn record(&mut self, outcome: &ChatResult<()>) {
        match outcome {
            Ok(()) => self.synced += 1,
            Err(error) if error.is_retryable() => self.remaining += 1,
            Err(_) => self.failed += 1,
        }
    }
}

impl CoordinatorInner {
    pub(crate) async fn sync_message_once(
        &self,
        action: MessageSync,
        message: &ChatMessage,
    ) -> ChatResult<ChatMessage> {
        match action {
            MessageSync::Send => self.remote.send_message(message).await,
            MessageSync::Update => self.remote.update_message(message).await,
            MessageSync::Delete => self.remote.delete_message(&message.cid, &message.id).await,
        }
    }

    pub(crate) async fn sync_reaction_once(&self, reaction: &Reaction) -> ChatResult<Reaction> {
        if reaction.is_deleted() {
            self.remote
                .delete_reaction(&reaction.cid, &reaction.message_id, &reaction.reaction_type)
                .await
        } else {
            self.remote
                .send_reaction(reaction, reaction.enforce_unique)
                .await
        }
    }

    /// Create a never-confirmed channel, then replay its hidden state
    async fn sync_channel_once(&self, channel: &Channel) -> ChatResult<Channel> {
        let mut server = if channel.created_at.is_none() {
            self.remote.create_channel(channel).await?
        } else {
            channel.clone()
        };
        if channel.hidden {
            self.remote
                .hide_channel(&channel.cid, channel.hide_messages_before.is_some())
                .await?;
            server.hidden = true;
        }
        Ok(server)
    }

    /// Replace the optimistic record with the server copy
    pub(crate) fn confirm_message(&self, provisional_id: &str, mut server: ChatMessage) -> ChatResult<ChatMessage> {
        if let Some(local) = self.store.message(&server.cid, provisional_id) {
            if server.own_reactions.is_empty() {
                server.own_reactions = local.own_reactions;
                server.reaction_counts = local.reaction_counts;
            }
        }
        server.sync_status = SyncStatus::Synced;
        server.version = self.store.next_version();
        self.store.rekey_message(provisional_id, &server)?;
        self.sessions.with_session(&server.cid, |s| {
            if provisional_id != server.id {
                s.remove_message(provisional_id);
            }
            s.upsert_message(server.clone());
        });
        debug!(cid = %server.cid, message_id = %server.id, "message confirmed");
        Ok(server)
    }

    /// Mark the message failed unless something newer already settled it
    pub(crate) fn fail_message(&self, local: &ChatMessage, error: &ChatError) {
        let Some(mut current) = self.store.message(&local.cid, &local.id) else {
            return;
        };
        if !current.sync_status.is_pending() {
            return;
        }
        current.sync_status = SyncStatus::FailedPermanently;
        current.version = self.store.next_version();
        if let Err(store_error) = self.write_message(&current) {
            warn!(message_id = %local.id, %store_error, "could not mark message failed");
            return;
        }
        debug!(cid = %local.cid, message_id = %local.id, %error, "message marked failed");
    }

    pub(crate) fn confirm_reaction(&self, mut server: Reaction) -> ChatResult<Reaction> {
        server.sync_status = SyncStatus::Synced;
        server.version = self.store.next_version();
        self.store.upsert_reaction(&server)?;
        Ok(server)
    }

    pub(crate) fn fail_reaction(&self, local: &Reaction, error: &ChatError) {
        let Some(mut current) = self.store.reaction(&local.cid, &local.key()) else {
            return;
        };
        if !current.sync_status.is_pending() {
            return;
        }
        current.sync_status = SyncStatus::FailedPermanently;
        current.version = self.store.next_version();
        if let Err(store_error) = self.store.upsert_reaction(&current) {
            warn!(reaction_type = %local.reaction_type, %store_error, "could not mark reaction failed");
            return;
        }
        debug!(cid = %local.cid, message_id = %local.message_id, %error, "reaction marked failed");
    }

    /// Store the server's channel, keeping the user's local visibility
    pub(crate) fn confirm_channel(&self, mut server: Channel) -> ChatResult<Channel> {
        if let Some(local) = self.store.channel(&server.cid) {
            server.hidden = local.hidden;
            server.hide_messages_before = local.hide_messages_before.or(server.hide_messages_before);
        }
        server.sync_status = SyncStatus::Synced;
        server.version = self.store.next_version();
        self.write_channel(&server)?;
        Ok(server)
    }

    pub(crate) fn fail_channel(&self, cid: &ChannelId, error: &ChatError) {
        let Some(mut current) = self.store.channel(cid) else {
            return;
        };
        if !current.sync_status.is_pending() {
            return;
        }
        current.sync_status = SyncStatus::FailedPermanently;
        current.version = self.store.next_version();
        if let Err(store_error) = self.write_channel(&current) {
            warn!(cid = %cid, %store_error, "could not mark channel failed");
            return;
        }
        debug!(cid = %cid, %error, "channel marked failed");
    }

    /// Store messages loaded from the remote; pending local records win
    pub(crate) fn store_remote_messages(&self, messages: Vec<ChatMessage>) -> ChatResult<Vec<ChatMessage>> {
        let mut stored = Vec::with_capacity(messages.len());
        for mut message in messages {
            if let Some(local) = self.store.message(&message.cid, &message.id) {
                if local.sync_status.is_pending() {
                    stored.push(local);
                    continue;
                }
            }
            message.sync_status = SyncStatus::Synced;
            message.version = self.store.next_version();
            self.write_message(&message)?;
            stored.push(message);
        }
        Ok(stored)
    }

    /// Store a watched or queried channel with its messages and read markers
    pub(crate) fn store_channel_state(&self, state: ChannelState) -> ChatResult<ChannelState> {
        let cid = state.channel.cid.clone();
        let channel = match self.store.channel(&cid) {
            Some(local) if local.sync_status.is_pending() => local,
            _ => {
                let mut channel = state.channel;
                channel.sync_status = SyncStatus::Synced;
                channel.version = self.store.next_version();
                self.write_channel(&channel)?;
                channel
            }
        };

        let messages = self.store_remote_messages(state.messages)?;

        let mut reads = Vec::with_capacity(state.reads.len());
        for mut read in state.reads {
            read.version = self.store.next_version();
            self.store.upsert_read(&cid, &read)?;
            reads.push(read);
        }

        Ok(ChannelState {
            channel,
            messages,
            reads,
        })
    }

    /// Push every `SyncNeeded` entity to the remote once
    pub(crate) async fn retry_failed_entities(&self) -> RetrySweep {
        let mut sweep = RetrySweep::default();

        for channel in self.store.channels_with_status(SyncStatus::SyncNeeded) {
            let outcome = match self.sync_channel_once(&channel).await {
                Ok(server) => self.confirm_channel(server).map(|_| ()),
                Err(error) => {
                    if error.is_permanent() {
                        self.fail_channel(&channel.cid, &error);
                    }
                    Err(error)
                }
            };
            sweep.record(&outcome);
        }

        for message in self.store.messages_with_status(SyncStatus::SyncNeeded) {
            let action = MessageSync::for_message(&message);
            let outcome = match self.sync_message_once(action, &message).await {
                Ok(server) => self.confirm_message(&message.id, server).map(|_| ()),
                Err(error) => {
                    if error.is_permanent() {
                        self.fail_message(&message, &error);
                    }
                    Err(error)
                }
            };
            sweep.record(&outcome);
        }

        for reaction in self.store.reactions_with_status(SyncStatus::SyncNeeded) {
            let outcome = match self.sync_reaction_once(&reaction).await {
                Ok(server) => self.confirm_reaction(server).map(|_| ()),
                Err(error) => {
                    if error.is_permanent() {
                        self.fail_reaction(&reaction, &error);
                    }
                    Err(error)
                }
            };
            sweep.record(&outcome);
        }

        if sweep != RetrySweep::default() {
            info!(
                synced = sweep.synced,
                failed = sweep.failed,
                remaining = sweep.remaining,
                "sync sweep finished"
            );
        }
        sweep
    }
}
