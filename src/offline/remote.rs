//! # Remote Client
//!
//! The network side of the chat core, as seen by the coordinator. One async
//! method per remote operation; implementations do the actual I/O and map
//! transport failures onto `ChatError::Network` / `ChatError::Server`.
//!
//! [`LoopbackRemote`](crate::offline::loopback::LoopbackRemote) is the
//! in-memory implementation used by tests and the simulator.

use crate::offline::operation::{MessagePage, QueryChannelsRequest, SearchRequest};
use crate::shared::error::ChatResult;
use crate::shared::messaging::{Channel, ChannelId, ChannelRead, ChatMessage, Reaction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A channel as returned by watch and query calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    pub channel: Channel,
    /// Latest messages, oldest first
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub reads: Vec<ChannelRead>,
}

/// Remote chat API
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    /// Send a new message; the returned copy carries server id and timestamps
    async fn send_message(&self, message: &ChatMessage) -> ChatResult<ChatMessage>;

    async fn update_message(&self, message: &ChatMessage) -> ChatResult<ChatMessage>;

    async fn delete_message(&self, cid: &ChannelId, message_id: &str) -> ChatResult<ChatMessage>;

    async fn send_reaction(&self, reaction: &Reaction, enforce_unique: bool) -> ChatResult<Reaction>;

    async fn delete_reaction(
        &self,
        cid: &ChannelId,
        message_id: &str,
        reaction_type: &str,
    ) -> ChatResult<Reaction>;

    async fn mark_read(&self, cid: &ChannelId) -> ChatResult<()>;

    async fn mark_all_read(&self) -> ChatResult<()>;

    async fn keystroke(&self, cid: &ChannelId, parent_id: Option<&str>) -> ChatResult<()>;

    async fn stop_typing(&self, cid: &ChannelId, parent_id: Option<&str>) -> ChatResult<()>;

    async fn watch_channel(&self, cid: &ChannelId, page: &MessagePage) -> ChatResult<ChannelState>;

    async fn stop_watching(&self, cid: &ChannelId) -> ChatResult<()>;

    async fn query_channels(&self, request: &QueryChannelsRequest) -> ChatResult<Vec<ChannelState>>;

    /// Messages older than `page.before_id`, oldest first
    async fn load_messages(&self, cid: &ChannelId, page: &MessagePage) -> ChatResult<Vec<ChatMessage>>;

    async fn search_messages(&self, request: &SearchRequest) -> ChatResult<Vec<ChatMessage>>;

    async fn create_channel(&self, channel: &Channel) -> ChatResult<Channel>;

    async fn hide_channel(&self, cid: &ChannelId, clear_history: bool) -> ChatResult<()>;

    async fn show_channel(&self, cid: &ChannelId) -> ChatResult<()>;

    async fn remove_members(&self, cid: &ChannelId, user_ids: &[String]) -> ChatResult<()>;

    async fn delete_channel(&self, cid: &ChannelId) -> ChatResult<Channel>;
}
