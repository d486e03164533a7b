//! # Incoming Events
//!
//! Folds [`ChatEvent`]s pushed by the remote into the local store and the
//! watched sessions. Events never overwrite a record that still has a local
//! mutation pending; the pending mutation's own reconciliation decides.

use crate::offline::coordinator::{Coordinator, CoordinatorInner};
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::event::ChatEvent;
use crate::shared::messaging::{ChannelId, ChannelRead, Reaction, SyncStatus};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

impl Coordinator {
    /// Apply a real-time event from the remote
    pub fn handle_event(&self, event: ChatEvent) -> ChatResult<()> {
        self.inner().apply_event(event)
    }
}

fn ignore_missing(result: ChatResult<bool>) -> ChatResult<()> {
    match result {
        Ok(_) | Err(ChatError::NotFound { .. }) => Ok(()),
        Err(error) => Err(error),
    }
}

impl CoordinatorInner {
    pub(crate) fn apply_event(&self, event: ChatEvent) -> ChatResult<()> {
        debug!(cid = %event.cid(), "applying remote event");
        match event {
            ChatEvent::TypingStart {
                cid,
                user_id,
                parent_id,
                ..
            } => {
                if user_id == self.user_id() {
                    return Ok(());
                }
                let expires_at = Instant::now() + Duration::from_millis(self.config.typing_expiry_ms);
                self.sessions
                    .with_session(&cid, |s| s.set_typing(&user_id, parent_id, expires_at));
                Ok(())
            }
            ChatEvent::TypingStop { cid, user_id, .. } => {
                self.sessions.with_session(&cid, |s| s.clear_typing(&user_id));
                Ok(())
            }
            ChatEvent::MessageNew { message } | ChatEvent::MessageUpdated { message } => {
                let cid = message.cid.clone();
                let author = message.user_id.clone();
                self.store_remote_messages(vec![message])?;
                self.sessions.with_session(&cid, |s| s.clear_typing(&author));
                Ok(())
            }
            ChatEvent::MessageDeleted {
                cid,
                message_id,
                deleted_at,
            } => {
                if let Some(local) = self.store.message(&cid, &message_id) {
                    if local.sync_status.is_pending() {
                        debug!(cid = %cid, message_id = %message_id, "delete deferred to pending mutation");
                        return Ok(());
                    }
                }
                ignore_missing(self.store.delete_message(
                    &cid,
                    &message_id,
                    deleted_at,
                    self.store.next_version(),
                ))?;
                if let Some(message) = self.store.message(&cid, &message_id) {
                    self.sessions.with_session(&cid, |s| s.upsert_message(message));
                }
                Ok(())
            }
            ChatEvent::ReactionNew { reaction } => self.apply_remote_reaction(reaction, true),
            ChatEvent::ReactionDeleted { reaction } => self.apply_remote_reaction(reaction, false),
            ChatEvent::MessageRead {
                cid,
                user_id,
                read_at,
            } => {
                let read = ChannelRead {
                    user_id,
                    last_read: read_at,
                    version: self.store.next_version(),
                };
                self.store.upsert_read(&cid, &read)?;
                self.sessions
                    .with_session(&cid, |s| s.update_read(&read.user_id, read.last_read));
                Ok(())
            }
            ChatEvent::MemberAdded { cid, member } => {
                self.update_members(&cid, |members| {
                    if !members.iter().any(|m| m.user_id == member.user_id) {
                        members.push(member);
                    }
                })
            }
            ChatEvent::MemberRemoved { cid, user_id } => {
                self.update_members(&cid, |members| members.retain(|m| m.user_id != user_id))?;
                if user_id == self.user_id() {
                    self.sessions.unwatch(&cid);
                }
                Ok(())
            }
            ChatEvent::ChannelDeleted { cid, deleted_at } => {
                ignore_missing(self.store.delete_channel(
                    &cid,
                    deleted_at,
                    self.store.next_version(),
                ))?;
                self.sessions.unwatch(&cid);
                Ok(())
            }
        }
    }

    fn apply_remote_reaction(&self, mut reaction: Reaction, added: bool) -> ChatResult<()> {
        if let Some(local) = self.store.reaction(&reaction.cid, &reaction.key()) {
            if local.sync_status.is_pending() {
                return Ok(());
            }
        }
        if !added && reaction.deleted_at.is_none() {
            reaction.deleted_at = Some(chrono::Utc::now());
        }
        reaction.sync_status = SyncStatus::Synced;
        reaction.version = self.store.next_version();
        self.store.upsert_reaction(&reaction)?;

        let Some(mut message) = self.store.message(&reaction.cid, &reaction.message_id) else {
            return Ok(());
        };
        if reaction.user_id == self.user_id() {
            if added {
                message.add_own_reaction(&reaction, reaction.enforce_unique);
            } else {
                message.remove_own_reaction(&reaction.reaction_type);
            }
        } else if added {
            *message
                .reaction_counts
                .entry(reaction.reaction_type.clone())
                .or_insert(0) += 1;
        } else if let Some(count) = message.reaction_counts.get_mut(&reaction.reaction_type) {
            *count = count.saturating_sub(1);
            message.reaction_counts.retain(|_, count| *count > 0);
        }
        message.version = self.store.next_version();
        self.write_message(&message)?;
        Ok(())
    }

    fn update_members(
        &self,
        cid: &ChannelId,
        f: impl FnOnce(&mut Vec<crate::shared::messaging::Member>),
    ) -> ChatResult<()> {
        let Some(mut channel) = self.store.channel(cid) else {
            return Ok(());
        };
        f(&mut channel.members);
        channel.version = self.store.next_version();
        self.write_channel(&channel)?;
        Ok(())
    }
}
