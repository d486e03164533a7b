//! Channel Data Structures
//!
//! Channel identifiers, channel records, members and read markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::message::SyncStatus;
use crate::shared::error::{ChatError, ChatResult};

const CID_SEPARATOR: char = ':';

/// Channel identifier in `type:id` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    channel_type: String,
    id: String,
}

impl ChannelId {
    /// Build from the two halves; both must be non-empty and separator-free
    pub fn new(channel_type: impl Into<String>, id: impl Into<String>) -> ChatResult<Self> {
        let channel_type = channel_type.into();
        let id = id.into();
        if channel_type.is_empty() || id.is_empty() {
            return Err(ChatError::validation(
                "cid",
                "channel type and id must both be non-empty",
            ));
        }
        if channel_type.contains(CID_SEPARATOR) || id.contains(CID_SEPARATOR) {
            return Err(ChatError::validation(
                "cid",
                "channel type and id must not contain ':'",
            ));
        }
        Ok(Self { channel_type, id })
    }

    /// Parse `type:id`; exactly one separator, both halves non-empty
    pub fn parse(raw: &str) -> ChatResult<Self> {
        if raw.is_empty() {
            return Err(ChatError::validation("cid", "channel id is empty"));
        }
        let mut parts = raw.split(CID_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(channel_type), Some(id), None) => Self::new(channel_type, id),
            _ => Err(ChatError::validation(
                "cid",
                format!("'{}' must contain exactly one ':' separator", raw),
            )),
        }
    }

    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.channel_type, CID_SEPARATOR, self.id)
    }
}

impl FromStr for ChannelId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ChatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelId> for String {
    fn from(cid: ChannelId) -> Self {
        cid.to_string()
    }
}

/// Channel member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl Member {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: None,
        }
    }
}

/// Per-user read marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRead {
    pub user_id: String,
    pub last_read: DateTime<Utc>,
    pub version: u64,
}

/// Channel record kept in the local store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub cid: ChannelId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub extra_data: serde_json::Map<String, serde_json::Value>,
    pub created_by: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hidden: bool,
    /// Messages older than this are hidden (hide with clear history)
    #[serde(default)]
    pub hide_messages_before: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    /// Local write version used for idempotent upserts
    #[serde(default)]
    pub version: u64,
}

impl Channel {
    /// Create a channel record owned by `created_by`
    pub fn new(cid: ChannelId, created_by: impl Into<String>) -> Self {
        Self {
            cid,
            name: None,
            members: Vec::new(),
            extra_data: serde_json::Map::new(),
            created_by: created_by.into(),
            created_at: None,
            updated_at: None,
            deleted_at: None,
            hidden: false,
            hide_messages_before: None,
            sync_status: SyncStatus::Synced,
            version: 0,
        }
    }

    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = members;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
