//! # Optimistic Writes
//!
//! Local effects applied at submit time, before the remote call. The store
//! and the watching session see the change immediately; the record carries
//! `InProgress` (or `SyncNeeded` while offline) until reconciliation.
//!
//! ## Features
//!
//! - **Immediate Visibility**: writes land before `submit` returns
//! - **No Rollback**: failed mutations stay visible as `FailedPermanently`
//! - **Audit Trail**: every write opens a [`PendingMutation`](crate::offline::pending::PendingMutation)
//!   holding the entity before and after

use crate::offline::call::Call;
use crate::offline::coordinator::CoordinatorInner;
use crate::offline::operation::{OperationKind, OperationResult};
use crate::offline::pending::EntitySnapshot;
use crate::offline::reconciliation::MessageSync;
use crate::offline::remote::ChannelState;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{
    Attachment, Channel, ChannelId, ChannelRead, ChatMessage, Member, Reaction, ReactionKey,
    SyncStatus,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

impl CoordinatorInner {
    /// Status for a fresh optimistic write
    pub(crate) fn local_status(&self) -> SyncStatus {
        if self.is_online() {
            SyncStatus::InProgress
        } else {
            SyncStatus::SyncNeeded
        }
    }

    /// Open a pending mutation and link it to the channel's session
    pub(crate) fn begin_mutation(
        &self,
        kind: OperationKind,
        cid: &ChannelId,
        before: Option<EntitySnapshot>,
        after: Option<EntitySnapshot>,
    ) -> Uuid {
        let id = self.pending.begin(kind, Some(cid.clone()), before, after);
        self.sessions.with_session(cid, |s| s.track(id));
        id
    }

    /// Finalize a mutation and return its result
    pub(crate) fn settle<T>(
        &self,
        mutation_id: Uuid,
        cid: Option<&ChannelId>,
        kind: OperationKind,
        result: ChatResult<T>,
    ) -> ChatResult<T> {
        self.pending.finish(&mutation_id, result.as_ref().map(|_| ()));
        if let Some(cid) = cid {
            self.sessions.with_session(cid, |s| s.untrack(&mutation_id));
        }
        match &result {
            Ok(_) => info!(%kind, %mutation_id, "mutation reconciled"),
            Err(error) => error!(%kind, %mutation_id, %error, "mutation failed permanently"),
        }
        result
    }

    /// Offline: leave the record `SyncNeeded` for the reconnect sweep
    fn park(&self, mutation_id: Uuid, cid: &ChannelId, result: OperationResult) -> Call<OperationResult> {
        self.pending.release(&mutation_id);
        self.sessions.with_session(cid, |s| s.untrack(&mutation_id));
        debug!(cid = %cid, %mutation_id, "offline, parked for sync");
        Call::ready(&self.scope, result)
    }

    /// The local write itself failed
    fn reject(
        &self,
        mutation_id: Uuid,
        cid: &ChannelId,
        kind: OperationKind,
        error: ChatError,
    ) -> Call<OperationResult> {
        let error = match self.settle::<()>(mutation_id, Some(cid), kind, Err(error)) {
            Err(error) => error,
            Ok(()) => ChatError::internal("local write rejected"),
        };
        Call::failed(&self.scope, error)
    }

    /// Store a message and mirror it into the watching session
    pub(crate) fn write_message(&self, message: &ChatMessage) -> ChatResult<bool> {
        let written = self.store.upsert_message(message)?;
        self.sessions
            .with_session(&message.cid, |s| s.upsert_message(message.clone()));
        Ok(written)
    }

    pub(crate) fn send_message(
        self: &Arc<Self>,
        cid: ChannelId,
        text: String,
        attachments: Vec<Attachment>,
        parent_id: Option<String>,
    ) -> Call<OperationResult> {
        let mut message = ChatMessage::new_text(cid, self.user_id(), text);
        message.attachments = attachments;
        message.parent_id = parent_id;
        message.sync_status = self.local_status();
        message.version = self.store.next_version();
        self.apply_message(OperationKind::SendMessage, None, message)
    }

    pub(crate) fn edit_message(self: &Arc<Self>, cid: ChannelId, message_id: &str, text: String) -> Call<OperationResult> {
        let Some(before) = self.store.message(&cid, message_id) else {
            return Call::failed(&self.scope, ChatError::not_found("message", message_id));
        };
        if before.is_deleted() {
            return Call::failed(
                &self.scope,
                ChatError::validation("message_id", "deleted messages cannot be edited"),
            );
        }
        let mut message = before.clone();
        message.text = text;
        message.updated_locally_at = Some(Utc::now());
        message.sync_status = self.local_status();
        message.version = self.store.next_version();
        let kind = MessageSync::for_message(&message).kind();
        self.apply_message(kind, Some(before), message)
    }

    pub(crate) fn delete_message(self: &Arc<Self>, cid: ChannelId, message_id: &str) -> Call<OperationResult> {
        let Some(before) = self.store.message(&cid, message_id) else {
            return Call::failed(&self.scope, ChatError::not_found("message", message_id));
        };
        let mut message = before.clone();
        message.deleted_at = Some(Utc::now());
        message.sync_status = self.local_status();
        message.version = self.store.next_version();
        self.apply_message(OperationKind::DeleteMessage, Some(before), message)
    }

    /// Retry a `FailedPermanently` message with a fresh attempt budget
    pub(crate) fn retry_message(self: &Arc<Self>, cid: &ChannelId, message_id: &str) -> Call<OperationResult> {
        let Some(before) = self.store.message(cid, message_id) else {
            return Call::failed(&self.scope, ChatError::not_found("message", message_id));
        };
        if before.sync_status != SyncStatus::FailedPermanently {
            return Call::failed(
                &self.scope,
                ChatError::validation("message_id", "only failed messages can be retried"),
            );
        }
        if before.is_deleted() && before.created_at.is_none() {
            return Call::failed(
                &self.scope,
                ChatError::validation("message_id", "discarded messages cannot be retried"),
            );
        }
        let mut message = before.clone();
        message.sync_status = self.local_status();
        message.version = self.store.next_version();
        let kind = MessageSync::for_message(&message).kind();
        info!(cid = %cid, message_id, %kind, "retrying failed message");
        self.apply_message(kind, Some(before), message)
    }

    /// Soft delete an unsent message without telling the remote
    pub(crate) fn discard_message(&self, cid: &ChannelId, message_id: &str) -> ChatResult<ChatMessage> {
        let mut message = self
            .store
            .message(cid, message_id)
            .ok_or_else(|| ChatError::not_found("message", message_id))?;
        if !matches!(
            message.sync_status,
            SyncStatus::FailedPermanently | SyncStatus::SyncNeeded
        ) {
            return Err(ChatError::validation(
                "message_id",
                "only unsent messages can be discarded",
            ));
        }
        message.deleted_at = Some(Utc::now());
        message.sync_status = SyncStatus::FailedPermanently;
        message.version = self.store.next_version();
        self.write_message(&message)?;
        info!(cid = %cid, message_id, "discarded unsent message");
        Ok(message)
    }

    fn apply_message(
        self: &Arc<Self>,
        kind: OperationKind,
        before: Option<ChatMessage>,
        message: ChatMessage,
    ) -> Call<OperationResult> {
        let cid = message.cid.clone();
        let mutation_id = self.begin_mutation(
            kind,
            &cid,
            before.map(EntitySnapshot::Message),
            Some(EntitySnapshot::Message(message.clone())),
        );
        if let Err(error) = self.write_message(&message) {
            return self.reject(mutation_id, &cid, kind, error);
        }
        debug!(cid = %cid, %mutation_id, message_id = %message.id, %kind, "optimistic message written");

        if !self.is_online() {
            return self.park(mutation_id, &cid, OperationResult::Message(message));
        }
        self.launch(move |inner, token| async move {
            let action = MessageSync::for_message(&message);
            let result = inner
                .run_remote(kind, Some(mutation_id), &token, || {
                    inner.sync_message_once(action, &message)
                })
                .await;
            let outcome = match result {
                Ok(server) => inner
                    .confirm_message(&message.id, server)
                    .map(OperationResult::Message),
                Err(error) => {
                    inner.fail_message(&message, &error);
                    Err(error)
                }
            };
            inner.settle(mutation_id, Some(&message.cid), kind, outcome)
        })
    }

    /// Store a reaction and keep the parent message's own reactions in step
    pub(crate) fn write_reaction(&self, reaction: &Reaction, enforce_unique: bool) -> ChatResult<()> {
        if enforce_unique && !reaction.is_deleted() {
            let now = Utc::now();
            let others = self
                .store
                .user_reactions(&reaction.cid, &reaction.message_id, &reaction.user_id);
            for other in others
                .iter()
                .filter(|r| r.reaction_type != reaction.reaction_type && !r.is_deleted())
            {
                self.store
                    .remove_reaction(&other.cid, &other.key(), now, self.store.next_version())?;
            }
        }
        self.store.upsert_reaction(reaction)?;

        if let Some(mut message) = self.store.message(&reaction.cid, &reaction.message_id) {
            if reaction.is_deleted() {
                message.remove_own_reaction(&reaction.reaction_type);
            } else {
                message.add_own_reaction(reaction, enforce_unique);
            }
            message.version = self.store.next_version();
            self.write_message(&message)?;
        }
        Ok(())
    }

    pub(crate) fn send_reaction(
        self: &Arc<Self>,
        cid: ChannelId,
        message_id: String,
        reaction_type: String,
        enforce_unique: bool,
    ) -> Call<OperationResult> {
        let reaction = Reaction {
            message_id,
            cid,
            user_id: self.user_id().to_string(),
            reaction_type,
            score: 1,
            enforce_unique,
            created_at: None,
            deleted_at: None,
            sync_status: self.local_status(),
            version: self.store.next_version(),
        };
        let before = self.store.reaction(&reaction.cid, &reaction.key());
        self.apply_reaction(OperationKind::SendReaction, before, reaction)
    }

    pub(crate) fn delete_reaction(
        self: &Arc<Self>,
        cid: ChannelId,
        message_id: String,
        reaction_type: String,
    ) -> Call<OperationResult> {
        let key = ReactionKey {
            message_id,
            user_id: self.user_id().to_string(),
            reaction_type,
        };
        let before = match self.store.reaction(&cid, &key) {
            Some(reaction) if !reaction.is_deleted() => reaction,
            _ => {
                return Call::failed(
                    &self.scope,
                    ChatError::not_found("reaction", key.reaction_type),
                )
            }
        };
        let mut reaction = before.clone();
        reaction.deleted_at = Some(Utc::now());
        reaction.sync_status = self.local_status();
        reaction.version = self.store.next_version();
        self.apply_reaction(OperationKind::DeleteReaction, Some(before), reaction)
    }

    fn apply_reaction(
        self: &Arc<Self>,
        kind: OperationKind,
        before: Option<Reaction>,
        reaction: Reaction,
    ) -> Call<OperationResult> {
        let cid = reaction.cid.clone();
        let mutation_id = self.begin_mutation(
            kind,
            &cid,
            before.map(EntitySnapshot::Reaction),
            Some(EntitySnapshot::Reaction(reaction.clone())),
        );
        if let Err(error) = self.write_reaction(&reaction, reaction.enforce_unique) {
            return self.reject(mutation_id, &cid, kind, error);
        }
        debug!(cid = %cid, %mutation_id, reaction_type = %reaction.reaction_type, %kind, "optimistic reaction written");

        if !self.is_online() {
            return self.park(mutation_id, &cid, OperationResult::Reaction(reaction));
        }
        self.launch(move |inner, token| async move {
            let result = inner
                .run_remote(kind, Some(mutation_id), &token, || {
                    inner.sync_reaction_once(&reaction)
                })
                .await;
            let outcome = match result {
                Ok(server) => inner.confirm_reaction(server).map(OperationResult::Reaction),
                Err(error) => {
                    inner.fail_reaction(&reaction, &error);
                    Err(error)
                }
            };
            inner.settle(mutation_id, Some(&reaction.cid), kind, outcome)
        })
    }

    /// Move the user's read marker to the newest message
    ///
    /// `Ok(None)` when there is nothing newer than the last marker.
    pub(crate) fn local_mark_read(&self, cid: &ChannelId) -> ChatResult<Option<ChannelRead>> {
        let Some(state) = self.store.read_channel_state(cid) else {
            return Ok(None);
        };
        let Some(last) = state.messages.iter().map(|m| m.sort_time()).max() else {
            return Ok(None);
        };
        let marker = self
            .sessions
            .with_session(cid, |s| s.last_mark_read())
            .flatten()
            .or_else(|| state.read_for(self.user_id()).map(|r| r.last_read));
        if marker.map_or(false, |marker| marker >= last) {
            return Ok(None);
        }

        let read = ChannelRead {
            user_id: self.user_id().to_string(),
            last_read: last,
            version: self.store.next_version(),
        };
        self.store.upsert_read(cid, &read)?;
        self.sessions.with_session(cid, |s| {
            s.update_read(&read.user_id, last);
            s.set_last_mark_read(last);
        });
        Ok(Some(read))
    }

    pub(crate) fn mark_read(self: &Arc<Self>, cid: ChannelId) -> Call<OperationResult> {
        let before = self
            .store
            .read_channel_state(&cid)
            .and_then(|s| s.read_for(self.user_id()).cloned());
        let read = match self.local_mark_read(&cid) {
            Ok(Some(read)) => read,
            Ok(None) => {
                debug!(cid = %cid, "read marker already current");
                return Call::ready(&self.scope, OperationResult::MarkedRead { changed: false });
            }
            Err(error) => return Call::failed(&self.scope, error),
        };
        let mutation_id = self.begin_mutation(
            OperationKind::MarkRead,
            &cid,
            Some(EntitySnapshot::Read {
                cid: cid.clone(),
                read: before,
            }),
            Some(EntitySnapshot::Read {
                cid: cid.clone(),
                read: Some(read),
            }),
        );

        if !self.is_online() {
            return self.park(mutation_id, &cid, OperationResult::MarkedRead { changed: true });
        }
        self.launch(move |inner, token| async move {
            let result = inner
                .run_remote(OperationKind::MarkRead, Some(mutation_id), &token, || {
                    inner.remote.mark_read(&cid)
                })
                .await;
            inner.settle(
                mutation_id,
                Some(&cid),
                OperationKind::MarkRead,
                result.map(|()| OperationResult::MarkedRead { changed: true }),
            )
        })
    }

    pub(crate) fn create_channel(
        self: &Arc<Self>,
        cid: ChannelId,
        name: Option<String>,
        members: Vec<String>,
        extra_data: serde_json::Map<String, serde_json::Value>,
    ) -> Call<OperationResult> {
        let before = self.store.channel(&cid);
        let mut member_ids = vec![self.user_id().to_string()];
        for member in members {
            if !member_ids.contains(&member) {
                member_ids.push(member);
            }
        }
        let mut channel = Channel::new(cid.clone(), self.user_id())
            .with_members(member_ids.into_iter().map(Member::new).collect());
        channel.name = name;
        channel.extra_data = extra_data;
        channel.sync_status = self.local_status();
        channel.version = self.store.next_version();

        self.sessions.watch(&cid);
        let mutation_id = self.begin_mutation(
            OperationKind::CreateChannel,
            &cid,
            before.map(EntitySnapshot::Channel),
            Some(EntitySnapshot::Channel(channel.clone())),
        );
        if let Err(error) = self.write_channel(&channel) {
            return self.reject(mutation_id, &cid, OperationKind::CreateChannel, error);
        }
        debug!(cid = %cid, %mutation_id, "optimistic channel written");

        if !self.is_online() {
            let state = ChannelState {
                channel,
                messages: Vec::new(),
                reads: Vec::new(),
            };
            return self.park(mutation_id, &cid, OperationResult::Channel(state));
        }
        self.launch(move |inner, token| async move {
            let result = inner
                .run_remote(OperationKind::CreateChannel, Some(mutation_id), &token, || {
                    inner.remote.create_channel(&channel)
                })
                .await;
            let outcome = match result {
                Ok(server) => inner.confirm_channel(server).map(|channel| {
                    OperationResult::Channel(ChannelState {
                        channel,
                        messages: Vec::new(),
                        reads: Vec::new(),
                    })
                }),
                Err(error) => {
                    inner.fail_channel(&cid, &error);
                    Err(error)
                }
            };
            inner.settle(mutation_id, Some(&cid), OperationKind::CreateChannel, outcome)
        })
    }

    pub(crate) fn hide_channel(self: &Arc<Self>, cid: ChannelId, clear_history: bool) -> Call<OperationResult> {
        let Some(before) = self.store.channel(&cid) else {
            return Call::failed(&self.scope, ChatError::not_found("channel", cid.to_string()));
        };
        let mut channel = before.clone();
        channel.hidden = true;
        if clear_history {
            channel.hide_messages_before = Some(Utc::now());
        }
        channel.sync_status = self.local_status();
        channel.version = self.store.next_version();

        let mutation_id = self.begin_mutation(
            OperationKind::HideChannel,
            &cid,
            Some(EntitySnapshot::Channel(before)),
            Some(EntitySnapshot::Channel(channel.clone())),
        );
        if let Err(error) = self.write_channel(&channel) {
            return self.reject(mutation_id, &cid, OperationKind::HideChannel, error);
        }

        if !self.is_online() {
            return self.park(mutation_id, &cid, OperationResult::Done);
        }
        self.launch(move |inner, token| async move {
            let result = inner
                .run_remote(OperationKind::HideChannel, Some(mutation_id), &token, || {
                    inner.remote.hide_channel(&cid, clear_history)
                })
                .await;
            let outcome = match result {
                Ok(()) => match inner.store.channel(&cid) {
                    Some(current) => inner.confirm_channel(current).map(|_| OperationResult::Done),
                    None => Ok(OperationResult::Done),
                },
                Err(error) => {
                    inner.fail_channel(&cid, &error);
                    Err(error)
                }
            };
            inner.settle(mutation_id, Some(&cid), OperationKind::HideChannel, outcome)
        })
    }

    /// Store a channel record and mirror it into the session
    pub(crate) fn write_channel(&self, channel: &Channel) -> ChatResult<bool> {
        let written = self.store.upsert_channel(channel)?;
        self.sessions.with_session(&channel.cid, |s| {
            s.hidden = channel.hidden;
            s.members = channel.members.clone();
            s.channel = Some(channel.clone());
        });
        Ok(written)
    }
}
