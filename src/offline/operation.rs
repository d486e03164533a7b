//! # Operations
//!
//! User intents accepted by [`Coordinator::submit`](crate::offline::Coordinator::submit).
//! An [`Operation`] carries raw caller input; [`Operation::validate`] turns it
//! into a [`ValidOperation`] with parsed channel ids and clamped pagination, or
//! rejects it with `ChatError::Validation` before anything is touched.
//!
//! ## Usage
//!
//! ```rust
//! use xfchat::offline::operation::{Operation, OperationKind};
//!
//! let op = Operation::send_message("messaging:general", "hello");
//! assert_eq!(op.kind(), OperationKind::SendMessage);
//! assert!(op.validate(100).is_ok());
//!
//! let bad = Operation::send_message("general", "hello");
//! assert!(bad.validate(100).is_err());
//! ```

use crate::offline::remote::ChannelState;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{Attachment, Channel, ChannelId, ChatMessage, Reaction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of an [`Operation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    SendMessage,
    EditMessage,
    DeleteMessage,
    SendReaction,
    DeleteReaction,
    MarkRead,
    MarkAllRead,
    Keystroke,
    StopTyping,
    WatchChannel,
    StopWatching,
    QueryChannels,
    LoadOlderMessages,
    HideChannel,
    ShowChannel,
    LeaveChannel,
    CreateChannel,
    DeleteChannel,
    SearchMessages,
}

impl OperationKind {
    /// Kinds that write local state before the remote call
    pub fn is_optimistic(&self) -> bool {
        matches!(
            self,
            OperationKind::SendMessage
                | OperationKind::EditMessage
                | OperationKind::DeleteMessage
                | OperationKind::SendReaction
                | OperationKind::DeleteReaction
                | OperationKind::MarkRead
                | OperationKind::MarkAllRead
                | OperationKind::CreateChannel
                | OperationKind::HideChannel
        )
    }

    /// Kinds whose remote failure is swallowed
    pub fn is_fire_and_forget(&self) -> bool {
        matches!(self, OperationKind::Keystroke | OperationKind::StopTyping)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::SendMessage => "send_message",
            OperationKind::EditMessage => "edit_message",
            OperationKind::DeleteMessage => "delete_message",
            OperationKind::SendReaction => "send_reaction",
            OperationKind::DeleteReaction => "delete_reaction",
            OperationKind::MarkRead => "mark_read",
            OperationKind::MarkAllRead => "mark_all_read",
            OperationKind::Keystroke => "keystroke",
            OperationKind::StopTyping => "stop_typing",
            OperationKind::WatchChannel => "watch_channel",
            OperationKind::StopWatching => "stop_watching",
            OperationKind::QueryChannels => "query_channels",
            OperationKind::LoadOlderMessages => "load_older_messages",
            OperationKind::HideChannel => "hide_channel",
            OperationKind::ShowChannel => "show_channel",
            OperationKind::LeaveChannel => "leave_channel",
            OperationKind::CreateChannel => "create_channel",
            OperationKind::DeleteChannel => "delete_channel",
            OperationKind::SearchMessages => "search_messages",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel query filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelFilter {
    /// Only channels of this type
    pub channel_type: Option<String>,
    /// Only channels with this member
    pub member: Option<String>,
    /// Include channels the user hid
    pub include_hidden: bool,
}

impl ChannelFilter {
    pub fn matches(&self, channel: &Channel) -> bool {
        if channel.is_deleted() || (channel.hidden && !self.include_hidden) {
            return false;
        }
        if let Some(channel_type) = &self.channel_type {
            if channel.cid.channel_type() != channel_type {
                return false;
            }
        }
        if let Some(member) = &self.member {
            if !channel.members.iter().any(|m| &m.user_id == member) {
                return false;
            }
        }
        true
    }
}

/// Channel query ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSort {
    /// Most recently updated first
    #[default]
    LastUpdated,
    /// Newest first
    CreatedAt,
}

/// One page of messages, fully described by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub limit: u32,
    /// Only messages older than this one
    pub before_id: Option<String>,
    /// Page a thread instead of the channel
    pub parent_id: Option<String>,
}

/// Channel query request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryChannelsRequest {
    pub filter: ChannelFilter,
    pub sort: ChannelSort,
    pub offset: u32,
    pub limit: u32,
    /// Messages to return per channel
    pub message_limit: u32,
}

/// Message search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub cids: Vec<ChannelId>,
    pub query: String,
    pub offset: u32,
    pub limit: u32,
}

/// Operation types accepted by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Send a new message, optionally as a thread reply
    SendMessage {
        cid: String,
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
        #[serde(default)]
        parent_id: Option<String>,
    },
    /// Replace a message's text
    EditMessage {
        cid: String,
        message_id: String,
        text: String,
    },
    /// Soft delete a message
    DeleteMessage { cid: String, message_id: String },
    /// React to a message
    SendReaction {
        cid: String,
        message_id: String,
        reaction_type: String,
        #[serde(default)]
        enforce_unique: bool,
    },
    /// Remove one of the user's reactions
    DeleteReaction {
        cid: String,
        message_id: String,
        reaction_type: String,
    },
    /// Mark one channel read
    MarkRead { cid: String },
    /// Mark every watched channel read
    MarkAllRead,
    /// The user typed
    Keystroke {
        cid: String,
        #[serde(default)]
        parent_id: Option<String>,
    },
    /// The user stopped typing
    StopTyping {
        cid: String,
        #[serde(default)]
        parent_id: Option<String>,
    },
    /// Start watching a channel and load its latest messages
    WatchChannel { cid: String, message_limit: i64 },
    /// Stop watching a channel
    StopWatching { cid: String },
    /// Query channels
    QueryChannels {
        #[serde(default)]
        filter: ChannelFilter,
        #[serde(default)]
        sort: ChannelSort,
        offset: i64,
        limit: i64,
        message_limit: i64,
    },
    /// Page older messages of a channel or thread
    LoadOlderMessages {
        cid: String,
        #[serde(default)]
        parent_id: Option<String>,
        #[serde(default)]
        before_id: Option<String>,
        limit: i64,
    },
    /// Hide a channel, optionally clearing its history
    HideChannel {
        cid: String,
        #[serde(default)]
        clear_history: bool,
    },
    /// Show a hidden channel
    ShowChannel { cid: String },
    /// Leave a channel as the current user
    LeaveChannel { cid: String },
    /// Create a channel
    CreateChannel {
        cid: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        members: Vec<String>,
        #[serde(default)]
        extra_data: serde_json::Map<String, serde_json::Value>,
    },
    /// Delete a channel
    DeleteChannel { cid: String },
    /// Full-text search in channels
    SearchMessages {
        cids: Vec<String>,
        query: String,
        offset: i64,
        limit: i64,
    },
}

impl Operation {
    pub fn send_message(cid: impl Into<String>, text: impl Into<String>) -> Self {
        Operation::SendMessage {
            cid: cid.into(),
            text: text.into(),
            attachments: Vec::new(),
            parent_id: None,
        }
    }

    pub fn reply(cid: impl Into<String>, parent_id: impl Into<String>, text: impl Into<String>) -> Self {
        Operation::SendMessage {
            cid: cid.into(),
            text: text.into(),
            attachments: Vec::new(),
            parent_id: Some(parent_id.into()),
        }
    }

    pub fn edit_message(
        cid: impl Into<String>,
        message_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Operation::EditMessage {
            cid: cid.into(),
            message_id: message_id.into(),
            text: text.into(),
        }
    }

    pub fn delete_message(cid: impl Into<String>, message_id: impl Into<String>) -> Self {
        Operation::DeleteMessage {
            cid: cid.into(),
            message_id: message_id.into(),
        }
    }

    pub fn send_reaction(
        cid: impl Into<String>,
        message_id: impl Into<String>,
        reaction_type: impl Into<String>,
    ) -> Self {
        Operation::SendReaction {
            cid: cid.into(),
            message_id: message_id.into(),
            reaction_type: reaction_type.into(),
            enforce_unique: false,
        }
    }

    pub fn delete_reaction(
        cid: impl Into<String>,
        message_id: impl Into<String>,
        reaction_type: impl Into<String>,
    ) -> Self {
        Operation::DeleteReaction {
            cid: cid.into(),
            message_id: message_id.into(),
            reaction_type: reaction_type.into(),
        }
    }

    pub fn mark_read(cid: impl Into<String>) -> Self {
        Operation::MarkRead { cid: cid.into() }
    }

    pub fn keystroke(cid: impl Into<String>) -> Self {
        Operation::Keystroke {
            cid: cid.into(),
            parent_id: None,
        }
    }

    pub fn stop_typing(cid: impl Into<String>) -> Self {
        Operation::StopTyping {
            cid: cid.into(),
            parent_id: None,
        }
    }

    pub fn watch(cid: impl Into<String>, message_limit: i64) -> Self {
        Operation::WatchChannel {
            cid: cid.into(),
            message_limit,
        }
    }

    pub fn create_channel(cid: impl Into<String>, members: Vec<String>) -> Self {
        Operation::CreateChannel {
            cid: cid.into(),
            name: None,
            members,
            extra_data: serde_json::Map::new(),
        }
    }

    /// Get the operation kind
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::SendMessage { .. } => OperationKind::SendMessage,
            Operation::EditMessage { .. } => OperationKind::EditMessage,
            Operation::DeleteMessage { .. } => OperationKind::DeleteMessage,
            Operation::SendReaction { .. } => OperationKind::SendReaction,
            Operation::DeleteReaction { .. } => OperationKind::DeleteReaction,
            Operation::MarkRead { .. } => OperationKind::MarkRead,
            Operation::MarkAllRead => OperationKind::MarkAllRead,
            Operation::Keystroke { .. } => OperationKind::Keystroke,
            Operation::StopTyping { .. } => OperationKind::StopTyping,
            Operation::WatchChannel { .. } => OperationKind::WatchChannel,
            Operation::StopWatching { .. } => OperationKind::StopWatching,
            Operation::QueryChannels { .. } => OperationKind::QueryChannels,
            Operation::LoadOlderMessages { .. } => OperationKind::LoadOlderMessages,
            Operation::HideChannel { .. } => OperationKind::HideChannel,
            Operation::ShowChannel { .. } => OperationKind::ShowChannel,
            Operation::LeaveChannel { .. } => OperationKind::LeaveChannel,
            Operation::CreateChannel { .. } => OperationKind::CreateChannel,
            Operation::DeleteChannel { .. } => OperationKind::DeleteChannel,
            Operation::SearchMessages { .. } => OperationKind::SearchMessages,
        }
    }

    /// Raw channel id, for channel-scoped operations
    pub fn cid(&self) -> Option<&str> {
        match self {
            Operation::SendMessage { cid, .. }
            | Operation::EditMessage { cid, .. }
            | Operation::DeleteMessage { cid, .. }
            | Operation::SendReaction { cid, .. }
            | Operation::DeleteReaction { cid, .. }
            | Operation::MarkRead { cid }
            | Operation::Keystroke { cid, .. }
            | Operation::StopTyping { cid, .. }
            | Operation::WatchChannel { cid, .. }
            | Operation::StopWatching { cid }
            | Operation::LoadOlderMessages { cid, .. }
            | Operation::HideChannel { cid, .. }
            | Operation::ShowChannel { cid }
            | Operation::LeaveChannel { cid }
            | Operation::CreateChannel { cid, .. }
            | Operation::DeleteChannel { cid } => Some(cid),
            Operation::MarkAllRead
            | Operation::QueryChannels { .. }
            | Operation::SearchMessages { .. } => None,
        }
    }

    /// Check every field and clamp pagination to `[0, max_limit]`
    pub fn validate(self, max_limit: u32) -> ChatResult<ValidOperation> {
        let valid = match self {
            Operation::SendMessage {
                cid,
                text,
                attachments,
                parent_id,
            } => {
                if text.trim().is_empty() && attachments.is_empty() {
                    return Err(ChatError::validation(
                        "text",
                        "message needs text or at least one attachment",
                    ));
                }
                ValidOperation::SendMessage {
                    cid: ChannelId::parse(&cid)?,
                    text,
                    attachments,
                    parent_id: optional_id("parent_id", parent_id)?,
                }
            }
            Operation::EditMessage {
                cid,
                message_id,
                text,
            } => {
                if text.trim().is_empty() {
                    return Err(ChatError::validation("text", "edited text is empty"));
                }
                ValidOperation::EditMessage {
                    cid: ChannelId::parse(&cid)?,
                    message_id: required("message_id", message_id)?,
                    text,
                }
            }
            Operation::DeleteMessage { cid, message_id } => ValidOperation::DeleteMessage {
                cid: ChannelId::parse(&cid)?,
                message_id: required("message_id", message_id)?,
            },
            Operation::SendReaction {
                cid,
                message_id,
                reaction_type,
                enforce_unique,
            } => ValidOperation::SendReaction {
                cid: ChannelId::parse(&cid)?,
                message_id: required("message_id", message_id)?,
                reaction_type: required("reaction_type", reaction_type)?,
                enforce_unique,
            },
            Operation::DeleteReaction {
                cid,
                message_id,
                reaction_type,
            } => ValidOperation::DeleteReaction {
                cid: ChannelId::parse(&cid)?,
                message_id: required("message_id", message_id)?,
                reaction_type: required("reaction_type", reaction_type)?,
            },
            Operation::MarkRead { cid } => ValidOperation::MarkRead {
                cid: ChannelId::parse(&cid)?,
            },
            Operation::MarkAllRead => ValidOperation::MarkAllRead,
            Operation::Keystroke { cid, parent_id } => ValidOperation::Keystroke {
                cid: ChannelId::parse(&cid)?,
                parent_id: optional_id("parent_id", parent_id)?,
            },
            Operation::StopTyping { cid, parent_id } => ValidOperation::StopTyping {
                cid: ChannelId::parse(&cid)?,
                parent_id: optional_id("parent_id", parent_id)?,
            },
            Operation::WatchChannel { cid, message_limit } => ValidOperation::WatchChannel {
                cid: ChannelId::parse(&cid)?,
                page: MessagePage {
                    limit: clamp_limit(message_limit, max_limit),
                    before_id: None,
                    parent_id: None,
                },
            },
            Operation::StopWatching { cid } => ValidOperation::StopWatching {
                cid: ChannelId::parse(&cid)?,
            },
            Operation::QueryChannels {
                filter,
                sort,
                offset,
                limit,
                message_limit,
            } => ValidOperation::QueryChannels {
                request: QueryChannelsRequest {
                    filter,
                    sort,
                    offset: clamp_offset(offset),
                    limit: clamp_limit(limit, max_limit),
                    message_limit: clamp_limit(message_limit, max_limit),
                },
            },
            Operation::LoadOlderMessages {
                cid,
                parent_id,
                before_id,
                limit,
            } => ValidOperation::LoadOlderMessages {
                cid: ChannelId::parse(&cid)?,
                page: MessagePage {
                    limit: clamp_limit(limit, max_limit),
                    before_id: optional_id("before_id", before_id)?,
                    parent_id: optional_id("parent_id", parent_id)?,
                },
            },
            Operation::HideChannel { cid, clear_history } => ValidOperation::HideChannel {
                cid: ChannelId::parse(&cid)?,
                clear_history,
            },
            Operation::ShowChannel { cid } => ValidOperation::ShowChannel {
                cid: ChannelId::parse(&cid)?,
            },
            Operation::LeaveChannel { cid } => ValidOperation::LeaveChannel {
                cid: ChannelId::parse(&cid)?,
            },
            Operation::CreateChannel {
                cid,
                name,
                members,
                extra_data,
            } => {
                if members.iter().any(|m| m.trim().is_empty()) {
                    return Err(ChatError::validation("members", "member ids must be non-empty"));
                }
                ValidOperation::CreateChannel {
                    cid: ChannelId::parse(&cid)?,
                    name,
                    members,
                    extra_data,
                }
            }
            Operation::DeleteChannel { cid } => ValidOperation::DeleteChannel {
                cid: ChannelId::parse(&cid)?,
            },
            Operation::SearchMessages {
                cids,
                query,
                offset,
                limit,
            } => {
                if cids.is_empty() {
                    return Err(ChatError::validation("cids", "search needs at least one channel"));
                }
                let cids = cids
                    .iter()
                    .map(|cid| ChannelId::parse(cid))
                    .collect::<ChatResult<Vec<_>>>()?;
                ValidOperation::SearchMessages {
                    request: SearchRequest {
                        cids,
                        query: required("query", query)?,
                        offset: clamp_offset(offset),
                        limit: clamp_limit(limit, max_limit),
                    },
                }
            }
        };
        Ok(valid)
    }
}

fn required(field: &str, value: String) -> ChatResult<String> {
    if value.trim().is_empty() {
        return Err(ChatError::validation(field, "must not be empty"));
    }
    Ok(value)
}

fn optional_id(field: &str, value: Option<String>) -> ChatResult<Option<String>> {
    value.map(|v| required(field, v)).transpose()
}

fn clamp_offset(raw: i64) -> u32 {
    raw.clamp(0, u32::MAX as i64) as u32
}

fn clamp_limit(raw: i64, max_limit: u32) -> u32 {
    raw.clamp(0, max_limit as i64) as u32
}

/// An operation whose input has been checked
#[derive(Debug, Clone, PartialEq)]
pub enum ValidOperation {
    SendMessage {
        cid: ChannelId,
        text: String,
        attachments: Vec<Attachment>,
        parent_id: Option<String>,
    },
    EditMessage {
        cid: ChannelId,
        message_id: String,
        text: String,
    },
    DeleteMessage {
        cid: ChannelId,
        message_id: String,
    },
    SendReaction {
        cid: ChannelId,
        message_id: String,
        reaction_type: String,
        enforce_unique: bool,
    },
    DeleteReaction {
        cid: ChannelId,
        message_id: String,
        reaction_type: String,
    },
    MarkRead {
        cid: ChannelId,
    },
    MarkAllRead,
    Keystroke {
        cid: ChannelId,
        parent_id: Option<String>,
    },
    StopTyping {
        cid: ChannelId,
        parent_id: Option<String>,
    },
    WatchChannel {
        cid: ChannelId,
        page: MessagePage,
    },
    StopWatching {
        cid: ChannelId,
    },
    QueryChannels {
        request: QueryChannelsRequest,
    },
    LoadOlderMessages {
        cid: ChannelId,
        page: MessagePage,
    },
    HideChannel {
        cid: ChannelId,
        clear_history: bool,
    },
    ShowChannel {
        cid: ChannelId,
    },
    LeaveChannel {
        cid: ChannelId,
    },
    CreateChannel {
        cid: ChannelId,
        name: Option<String>,
        members: Vec<String>,
        extra_data: serde_json::Map<String, serde_json::Value>,
    },
    DeleteChannel {
        cid: ChannelId,
    },
    SearchMessages {
        request: SearchRequest,
    },
}

/// What a completed operation resolves to
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// The message after reconciliation (or the local copy while offline)
    Message(ChatMessage),
    Reaction(Reaction),
    /// `changed` is false when the read marker was already current
    MarkedRead { changed: bool },
    /// Number of watched channels whose marker moved
    MarkedAllRead { channels: usize },
    /// `sent` is false when throttled, not outstanding, or the remote failed
    Typing { sent: bool },
    Channel(ChannelState),
    Channels(Vec<ChannelState>),
    Messages(Vec<ChatMessage>),
    Done,
}

impl OperationResult {
    pub fn into_message(self) -> Option<ChatMessage> {
        match self {
            OperationResult::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn into_reaction(self) -> Option<Reaction> {
        match self {
            OperationResult::Reaction(reaction) => Some(reaction),
            _ => None,
        }
    }

    pub fn into_messages(self) -> Option<Vec<ChatMessage>> {
        match self {
            OperationResult::Messages(messages) => Some(messages),
            _ => None,
        }
    }
}
