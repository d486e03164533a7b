//! # Loopback Remote
//!
//! An in-memory [`RemoteClient`] that behaves like a well-mannered server:
//! it stamps server timestamps, keeps channels, messages and reactions, and
//! answers queries from what it holds. A [`FailurePlan`] injects errors per
//! operation kind, and every call is counted so tests can assert exactly how
//! often the coordinator reached the network.
//!
//! ## Usage
//!
//! ```rust
//! use xfchat::offline::loopback::{FailurePlan, LoopbackRemote};
//! use xfchat::offline::operation::OperationKind;
//! use xfchat::shared::ChatError;
//!
//! let plan = FailurePlan::new().fail_times(OperationKind::SendMessage, 2, ChatError::network("flaky"));
//! let remote = LoopbackRemote::with_plan(plan);
//! assert_eq!(remote.calls(OperationKind::SendMessage), 0);
//! ```

use crate::offline::operation::{ChannelSort, MessagePage, OperationKind, QueryChannelsRequest, SearchRequest};
use crate::offline::remote::{ChannelState, RemoteClient};
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{Channel, ChannelId, ChatMessage, Reaction, SyncStatus};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Scripted failures for a [`LoopbackRemote`]
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    scripted: HashMap<OperationKind, VecDeque<ChatError>>,
    always: HashMap<OperationKind, ChatError>,
}

impl FailurePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `kind` with `error`
    pub fn fail_times(mut self, kind: OperationKind, times: usize, error: ChatError) -> Self {
        let queue = self.scripted.entry(kind).or_default();
        queue.extend(std::iter::repeat(error).take(times));
        self
    }

    /// Fail every call of `kind` with `error`
    pub fn fail_always(mut self, kind: OperationKind, error: ChatError) -> Self {
        self.always.insert(kind, error);
        self
    }

    fn next_failure(&mut self, kind: OperationKind) -> Option<ChatError> {
        if let Some(error) = self.scripted.get_mut(&kind).and_then(|q| q.pop_front()) {
            return Some(error);
        }
        self.always.get(&kind).cloned()
    }
}

type CallObserver = Arc<dyn Fn(OperationKind) + Send + Sync>;

#[derive(Default)]
struct ServerState {
    channels: HashMap<ChannelId, Channel>,
    messages: HashMap<ChannelId, Vec<ChatMessage>>,
    reactions: Vec<Reaction>,
    next_id: u64,
}

impl ServerState {
    fn channel_state(&self, channel: &Channel, message_limit: u32) -> ChannelState {
        let messages = self
            .messages
            .get(&channel.cid)
            .map(|all| {
                let top_level: Vec<&ChatMessage> =
                    all.iter().filter(|m| m.parent_id.is_none()).collect();
                let skip = top_level.len().saturating_sub(message_limit as usize);
                top_level.into_iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();
        ChannelState {
            channel: channel.clone(),
            messages,
            reads: Vec::new(),
        }
    }

    fn ensure_channel(&mut self, cid: &ChannelId) -> Channel {
        self.channels
            .entry(cid.clone())
            .or_insert_with(|| {
                let mut channel = Channel::new(cid.clone(), "server");
                channel.created_at = Some(Utc::now());
                channel
            })
            .clone()
    }
}

/// In-memory remote with failure injection and call counters
pub struct LoopbackRemote {
    state: Mutex<ServerState>,
    plan: Mutex<FailurePlan>,
    calls: Mutex<HashMap<OperationKind, u32>>,
    log: Mutex<Vec<OperationKind>>,
    observer: Mutex<Option<CallObserver>>,
    latency: Mutex<Duration>,
    assign_ids: bool,
}

impl LoopbackRemote {
    pub fn new() -> Self {
        Self::with_plan(FailurePlan::default())
    }

    pub fn with_plan(plan: FailurePlan) -> Self {
        Self {
            state: Mutex::new(ServerState::default()),
            plan: Mutex::new(plan),
            calls: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            observer: Mutex::new(None),
            latency: Mutex::new(Duration::ZERO),
            assign_ids: false,
        }
    }

    /// Replace client-generated message ids with server ids on send
    pub fn assigning_server_ids(mut self) -> Self {
        self.assign_ids = true;
        self
    }

    /// Replace the failure plan
    pub fn set_plan(&self, plan: FailurePlan) {
        *self.plan.lock() = plan;
    }

    /// Simulated round-trip time for every call
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Run `observer` at the start of every call, before any failure is injected
    pub fn set_observer(&self, observer: impl Fn(OperationKind) + Send + Sync + 'static) {
        *self.observer.lock() = Some(Arc::new(observer));
    }

    /// Preload a channel and its messages
    pub fn seed_channel(&self, channel: Channel, messages: Vec<ChatMessage>) {
        let mut state = self.state.lock();
        state.messages.entry(channel.cid.clone()).or_default().extend(messages);
        state.channels.insert(channel.cid.clone(), channel);
    }

    /// Number of calls made for `kind`
    pub fn calls(&self, kind: OperationKind) -> u32 {
        self.calls.lock().get(&kind).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }

    /// Every call in arrival order
    pub fn call_log(&self) -> Vec<OperationKind> {
        self.log.lock().clone()
    }

    /// Messages the server holds for a channel
    pub fn server_messages(&self, cid: &ChannelId) -> Vec<ChatMessage> {
        self.state.lock().messages.get(cid).cloned().unwrap_or_default()
    }

    async fn enter(&self, kind: OperationKind) -> ChatResult<()> {
        *self.calls.lock().entry(kind).or_insert(0) += 1;
        self.log.lock().push(kind);
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            observer(kind);
        }
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match self.plan.lock().next_failure(kind) {
            Some(error) => {
                tracing::debug!(%kind, %error, "loopback injected failure");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl Default for LoopbackRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteClient for LoopbackRemote {
    async fn send_message(&self, message: &ChatMessage) -> ChatResult<ChatMessage> {
        self.enter(OperationKind::SendMessage).await?;
        let mut state = self.state.lock();
        state.ensure_channel(&message.cid);

        let mut stored = message.clone();
        if self.assign_ids {
            state.next_id += 1;
            stored.id = format!("srv-{}", state.next_id);
        }
        let now = Utc::now();
        stored.created_at = Some(now);
        stored.updated_at = Some(now);
        stored.sync_status = SyncStatus::Synced;

        let messages = state.messages.entry(stored.cid.clone()).or_default();
        messages.retain(|m| m.id != stored.id);
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn update_message(&self, message: &ChatMessage) -> ChatResult<ChatMessage> {
        self.enter(OperationKind::EditMessage).await?;
        let mut state = self.state.lock();
        let messages = state.messages.entry(message.cid.clone()).or_default();
        let mut stored = message.clone();
        stored.updated_at = Some(Utc::now());
        stored.sync_status = SyncStatus::Synced;
        if let Some(existing) = messages.iter_mut().find(|m| m.id == message.id) {
            stored.created_at = existing.created_at.or(stored.created_at);
            *existing = stored.clone();
        } else {
            stored.created_at = stored.created_at.or(Some(Utc::now()));
            messages.push(stored.clone());
        }
        Ok(stored)
    }

    async fn delete_message(&self, cid: &ChannelId, message_id: &str) -> ChatResult<ChatMessage> {
        self.enter(OperationKind::DeleteMessage).await?;
        let mut state = self.state.lock();
        let message = state
            .messages
            .get_mut(cid)
            .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
            .ok_or_else(|| ChatError::not_found("message", message_id))?;
        let now = Utc::now();
        message.deleted_at = Some(now);
        message.updated_at = Some(now);
        Ok(message.clone())
    }

    async fn send_reaction(&self, reaction: &Reaction, enforce_unique: bool) -> ChatResult<Reaction> {
        self.enter(OperationKind::SendReaction).await?;
        let mut state = self.state.lock();
        let now = Utc::now();
        if enforce_unique {
            for other in state.reactions.iter_mut().filter(|r| {
                r.message_id == reaction.message_id
                    && r.user_id == reaction.user_id
                    && r.deleted_at.is_none()
            }) {
                other.deleted_at = Some(now);
            }
        }
        state.reactions.retain(|r| r.key() != reaction.key());
        let mut stored = reaction.clone();
        stored.created_at = Some(now);
        stored.deleted_at = None;
        stored.sync_status = SyncStatus::Synced;
        state.reactions.push(stored.clone());
        Ok(stored)
    }

    async fn delete_reaction(
        &self,
        cid: &ChannelId,
        message_id: &str,
        reaction_type: &str,
    ) -> ChatResult<Reaction> {
        self.enter(OperationKind::DeleteReaction).await?;
        let mut state = self.state.lock();
        let reaction = state
            .reactions
            .iter_mut()
            .find(|r| {
                &r.cid == cid
                    && r.message_id == message_id
                    && r.reaction_type == reaction_type
                    && r.deleted_at.is_none()
            })
            .ok_or_else(|| ChatError::not_found("reaction", reaction_type))?;
        reaction.deleted_at = Some(Utc::now());
        Ok(reaction.clone())
    }

    async fn mark_read(&self, _cid: &ChannelId) -> ChatResult<()> {
        self.enter(OperationKind::MarkRead).await
    }

    async fn mark_all_read(&self) -> ChatResult<()> {
        self.enter(OperationKind::MarkAllRead).await
    }

    async fn keystroke(&self, _cid: &ChannelId, _parent_id: Option<&str>) -> ChatResult<()> {
        self.enter(OperationKind::Keystroke).await
    }

    async fn stop_typing(&self, _cid: &ChannelId, _parent_id: Option<&str>) -> ChatResult<()> {
        self.enter(OperationKind::StopTyping).await
    }

    async fn watch_channel(&self, cid: &ChannelId, page: &MessagePage) -> ChatResult<ChannelState> {
        self.enter(OperationKind::WatchChannel).await?;
        let mut state = self.state.lock();
        let channel = state.ensure_channel(cid);
        Ok(state.channel_state(&channel, page.limit))
    }

    async fn stop_watching(&self, _cid: &ChannelId) -> ChatResult<()> {
        self.enter(OperationKind::StopWatching).await
    }

    async fn query_channels(&self, request: &QueryChannelsRequest) -> ChatResult<Vec<ChannelState>> {
        self.enter(OperationKind::QueryChannels).await?;
        let state = self.state.lock();
        let mut channels: Vec<&Channel> = state
            .channels
            .values()
            .filter(|c| request.filter.matches(c))
            .collect();
        match request.sort {
            ChannelSort::LastUpdated => channels.sort_by(|a, b| {
                b.updated_at
                    .or(b.created_at)
                    .cmp(&a.updated_at.or(a.created_at))
                    .then_with(|| a.cid.cmp(&b.cid))
            }),
            ChannelSort::CreatedAt => {
                channels.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.cid.cmp(&b.cid)))
            }
        }
        Ok(channels
            .into_iter()
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .map(|c| state.channel_state(c, request.message_limit))
            .collect())
    }

    async fn load_messages(&self, cid: &ChannelId, page: &MessagePage) -> ChatResult<Vec<ChatMessage>> {
        self.enter(OperationKind::LoadOlderMessages).await?;
        let state = self.state.lock();
        let all = state.messages.get(cid).cloned().unwrap_or_default();
        let scoped: Vec<ChatMessage> = all
            .into_iter()
            .filter(|m| m.parent_id == page.parent_id)
            .collect();
        let end = match &page.before_id {
            Some(before) => scoped
                .iter()
                .position(|m| &m.id == before)
                .ok_or_else(|| ChatError::not_found("message", before.clone()))?,
            None => scoped.len(),
        };
        let start = end.saturating_sub(page.limit as usize);
        Ok(scoped[start..end].to_vec())
    }

    async fn search_messages(&self, request: &SearchRequest) -> ChatResult<Vec<ChatMessage>> {
        self.enter(OperationKind::SearchMessages).await?;
        let needle = request.query.to_lowercase();
        let state = self.state.lock();
        Ok(request
            .cids
            .iter()
            .filter_map(|cid| state.messages.get(cid))
            .flatten()
            .filter(|m| !m.is_deleted() && m.text.to_lowercase().contains(&needle))
            .skip(request.offset as usize)
            .take(request.limit as usize)
            .cloned()
            .collect())
    }

    async fn create_channel(&self, channel: &Channel) -> ChatResult<Channel> {
        self.enter(OperationKind::CreateChannel).await?;
        let mut state = self.state.lock();
        let stored = state.channels.entry(channel.cid.clone()).or_insert_with(|| {
            let mut stored = channel.clone();
            stored.created_at = Some(Utc::now());
            stored.sync_status = SyncStatus::Synced;
            stored
        });
        Ok(stored.clone())
    }

    async fn hide_channel(&self, cid: &ChannelId, _clear_history: bool) -> ChatResult<()> {
        self.enter(OperationKind::HideChannel).await?;
        if let Some(channel) = self.state.lock().channels.get_mut(cid) {
            channel.hidden = true;
        }
        Ok(())
    }

    async fn show_channel(&self, cid: &ChannelId) -> ChatResult<()> {
        self.enter(OperationKind::ShowChannel).await?;
        if let Some(channel) = self.state.lock().channels.get_mut(cid) {
            channel.hidden = false;
        }
        Ok(())
    }

    async fn remove_members(&self, cid: &ChannelId, user_ids: &[String]) -> ChatResult<()> {
        self.enter(OperationKind::LeaveChannel).await?;
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(cid)
            .ok_or_else(|| ChatError::not_found("channel", cid.to_string()))?;
        channel.members.retain(|m| !user_ids.contains(&m.user_id));
        Ok(())
    }

    async fn delete_channel(&self, cid: &ChannelId) -> ChatResult<Channel> {
        self.enter(OperationKind::DeleteChannel).await?;
        let mut state = self.state.lock();
        let channel = state
            .channels
            .get_mut(cid)
            .ok_or_else(|| ChatError::not_found("channel", cid.to_string()))?;
        channel.deleted_at = Some(Utc::now());
        Ok(channel.clone())
    }
}
