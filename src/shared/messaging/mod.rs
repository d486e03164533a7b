//! Messaging Module
//!
//! This module contains the data structures for the chat domain:
//!
//! - `ChannelId` - a channel identifier in `type:id` form
//! - `Channel` - a channel record with members and visibility
//! - `ChatMessage` - a message in a channel
//! - `Reaction` - a user's reaction on a message
//! - `SyncStatus` - per-entity mutation lifecycle marker
//!
//! # Usage
//!
//! ```rust
//! use xfchat::shared::messaging::{ChannelId, ChatMessage, SyncStatus};
//!
//! let cid = ChannelId::parse("messaging:general").unwrap();
//! let message = ChatMessage::new_text(cid, "alice", "hi");
//! assert_eq!(message.sync_status, SyncStatus::InProgress);
//! ```

pub mod channel;
pub mod message;
pub mod reaction;

// Re-export all types
pub use channel::{Channel, ChannelId, ChannelRead, Member};
pub use message::{Attachment, ChatMessage, SyncStatus};
pub use reaction::{Reaction, ReactionKey};
