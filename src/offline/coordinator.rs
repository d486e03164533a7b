//! # Mutation Coordinator
//!
//! The single entry point for user intents. [`Coordinator::submit`] validates
//! an [`Operation`], applies its optimistic local effect synchronously, and
//! returns a [`Call`] that completes once the remote outcome has been
//! reconciled into the local store.
//!
//! ## Flow
//!
//! 1. Validate channel id and payload; reject before touching anything
//! 2. Optimistic kinds write the local store (and the watching session)
//! 3. The remote call runs on the coordinator's scope under the retry policy
//! 4. Success overwrites the optimistic record with the server copy (`Synced`)
//! 5. Exhausted or permanent failure marks it `FailedPermanently`, never removes it
//!
//! Read-style kinds (watch, query, load more, search, show, leave, delete)
//! skip step 2 and write the store only on success.
//!
//! ## Offline
//!
//! While offline, optimistic kinds write `SyncNeeded` and resolve right away
//! with the local entity; read-style kinds fail with `ChatError::Network`.
//! Going back online sweeps everything marked `SyncNeeded`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfchat::offline::{Coordinator, LoopbackRemote, Operation};
//! use xfchat::shared::AppConfig;
//!
//! # async fn example() -> xfchat::shared::ChatResult<()> {
//! let coordinator = Coordinator::builder()
//!     .config(AppConfig::builder().user_id("alice").build().expect("valid config"))
//!     .remote(Arc::new(LoopbackRemote::new()))
//!     .build()?;
//!
//! let call = coordinator.submit(Operation::send_message("messaging:general", "hi"));
//! // the message is already in the local store here
//! let result = call.execute().await?;
//! # Ok(())
//! # }
//! ```

use crate::local_store::{LocalStore, StoreEvent};
use crate::offline::call::{Call, CancelToken, Scope};
use crate::offline::operation::{Operation, OperationKind, OperationResult, ValidOperation};
use crate::offline::pending::PendingRegistry;
use crate::offline::reconciliation::RetrySweep;
use crate::offline::remote::RemoteClient;
use crate::offline::retry::{DefaultRetryPolicy, RetryPolicy};
use crate::offline::session::SessionRegistry;
use crate::shared::config::AppConfig;
use crate::shared::error::{ChatError, ChatResult};
use crate::shared::messaging::{ChannelId, ChatMessage};
use futures_util::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shared state behind a [`Coordinator`]
pub(crate) struct CoordinatorInner {
    pub(crate) config: AppConfig,
    pub(crate) remote: Arc<dyn RemoteClient>,
    pub(crate) store: Arc<LocalStore>,
    pub(crate) sessions: SessionRegistry,
    pub(crate) pending: PendingRegistry,
    pub(crate) policy: Arc<dyn RetryPolicy>,
    pub(crate) scope: Scope,
    online: AtomicBool,
    tokens: Mutex<HashMap<u64, CancelToken>>,
    next_token: AtomicU64,
}

/// Applies operations locally and reconciles them with the remote
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

/// Builder for [`Coordinator`]
#[derive(Default)]
pub struct CoordinatorBuilder {
    config: Option<AppConfig>,
    remote: Option<Arc<dyn RemoteClient>>,
    store: Option<Arc<LocalStore>>,
    policy: Option<Arc<dyn RetryPolicy>>,
    scope: Option<Scope>,
}

impl CoordinatorBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Remote client; required
    pub fn remote(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Share an existing store, e.g. one loaded from a snapshot
    pub fn store(mut self, store: Arc<LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Retry policy; defaults to exponential backoff from `config.retry`
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Scope calls run on; defaults to the current runtime
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Build the coordinator
    pub fn build(self) -> ChatResult<Coordinator> {
        let remote = self
            .remote
            .ok_or_else(|| ChatError::validation("remote", "a remote client is required"))?;
        let config = self.config.unwrap_or_default();
        config
            .validate()
            .map_err(|e| ChatError::validation("config", e.to_string()))?;
        let scope = match self.scope {
            Some(scope) => scope,
            None => Scope::current()?,
        };
        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(DefaultRetryPolicy::from_config(&config.retry)));

        info!(user_id = %config.user_id, "coordinator ready");
        Ok(Coordinator {
            inner: Arc::new(CoordinatorInner {
                config,
                remote,
                store: self.store.unwrap_or_default(),
                sessions: SessionRegistry::new(),
                pending: PendingRegistry::new(),
                policy,
                scope,
                online: AtomicBool::new(true),
                tokens: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(0),
            }),
        })
    }
}

impl Coordinator {
    /// Create a new CoordinatorBuilder
    pub fn builder() -> CoordinatorBuilder {
        CoordinatorBuilder::default()
    }

    /// Submit an operation
    ///
    /// Optimistic effects are visible in the store when this returns; the
    /// call resolves after reconciliation.
    pub fn submit(&self, op: Operation) -> Call<OperationResult> {
        let kind = op.kind();
        let valid = match op.validate(self.inner.config.max_query_limit) {
            Ok(valid) => valid,
            Err(error) => {
                debug!(%kind, %error, "operation rejected");
                return Call::failed(&self.inner.scope, error);
            }
        };
        info!(%kind, "operation submitted");
        self.inner.dispatch(valid)
    }

    /// Retry a message that failed permanently, with a fresh attempt budget
    pub fn retry_message(&self, cid: &ChannelId, message_id: &str) -> Call<OperationResult> {
        self.inner.retry_message(cid, message_id)
    }

    /// Give up on an unsent message: soft delete it locally, no remote call
    pub fn discard_message(&self, cid: &ChannelId, message_id: &str) -> ChatResult<ChatMessage> {
        self.inner.discard_message(cid, message_id)
    }

    /// Check if the coordinator is currently online
    pub fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    /// Update online status; going online sweeps `SyncNeeded` entities
    pub async fn set_online(&self, online: bool) -> RetrySweep {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            info!(online, "connectivity changed");
        }
        if online {
            return self.inner.retry_failed_entities().await;
        }
        RetrySweep::default()
    }

    /// Push every `SyncNeeded` channel, message and reaction once
    pub async fn retry_failed_entities(&self) -> RetrySweep {
        self.inner.retry_failed_entities().await
    }

    /// Cancel every call still running; returns how many were signalled
    pub fn cancel_all(&self) -> usize {
        let tokens = self.inner.tokens.lock();
        for token in tokens.values() {
            token.cancel();
        }
        if !tokens.is_empty() {
            info!(calls = tokens.len(), "cancelled outstanding calls");
        }
        tokens.len()
    }

    /// Drop expired typing indicators
    pub fn prune_typing(&self) -> usize {
        self.inner.sessions.prune_typing(Instant::now())
    }

    /// Prune typing indicators every `every` until the coordinator is dropped
    pub fn spawn_typing_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let weak: Weak<CoordinatorInner> = Arc::downgrade(&self.inner);
        self.inner.scope.spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                match weak.upgrade() {
                    Some(inner) => {
                        let removed = inner.sessions.prune_typing(Instant::now());
                        if removed > 0 {
                            debug!(removed, "expired typing indicators");
                        }
                    }
                    None => break,
                }
            }
        })
    }

    /// Subscribe to local store changes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.store.subscribe()
    }

    /// Write the store snapshot to the configured path
    pub fn save_store(&self) -> ChatResult<PathBuf> {
        let path = self.inner.config.store_path();
        self.inner.store.save_to(&path)?;
        Ok(path)
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.inner.store
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub fn pending(&self) -> &PendingRegistry {
        &self.inner.pending
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub(crate) fn inner(&self) -> &Arc<CoordinatorInner> {
        &self.inner
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("user_id", &self.inner.config.user_id)
            .field("online", &self.inner.is_online())
            .field("sessions", &self.inner.sessions.len())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl CoordinatorInner {
    pub(crate) fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub(crate) fn user_id(&self) -> &str {
        &self.config.user_id
    }

    fn dispatch(self: &Arc<Self>, op: ValidOperation) -> Call<OperationResult> {
        match op {
            ValidOperation::SendMessage {
                cid,
                text,
                attachments,
                parent_id,
            } => self.send_message(cid, text, attachments, parent_id),
            ValidOperation::EditMessage {
                cid,
                message_id,
                text,
            } => self.edit_message(cid, &message_id, text),
            ValidOperation::DeleteMessage { cid, message_id } => self.delete_message(cid, &message_id),
            ValidOperation::SendReaction {
                cid,
                message_id,
                reaction_type,
                enforce_unique,
            } => self.send_reaction(cid, message_id, reaction_type, enforce_unique),
            ValidOperation::DeleteReaction {
                cid,
                message_id,
                reaction_type,
            } => self.delete_reaction(cid, message_id, reaction_type),
            ValidOperation::MarkRead { cid } => self.mark_read(cid),
            ValidOperation::MarkAllRead => self.mark_all_read(),
            ValidOperation::Keystroke { cid, parent_id } => self.keystroke(cid, parent_id),
            ValidOperation::StopTyping { cid, parent_id } => self.stop_typing(cid, parent_id),
            ValidOperation::CreateChannel {
                cid,
                name,
                members,
                extra_data,
            } => self.create_channel(cid, name, members, extra_data),
            ValidOperation::HideChannel { cid, clear_history } => self.hide_channel(cid, clear_history),
            ValidOperation::WatchChannel { cid, page } => {
                self.remote_only(OperationKind::WatchChannel, move |inner, token| async move {
                    let state = inner
                        .run_remote(OperationKind::WatchChannel, None, &token, || {
                            inner.remote.watch_channel(&cid, &page)
                        })
                        .await?;
                    let state = inner.store_channel_state(state)?;
                    inner.sessions.watch(&cid);
                    inner.sessions.with_session(&cid, |s| s.apply_state(&state));
                    info!(cid = %cid, messages = state.messages.len(), "watching channel");
                    Ok(OperationResult::Channel(state))
                })
            }
            ValidOperation::StopWatching { cid } => {
                self.remote_only(OperationKind::StopWatching, move |inner, token| async move {
                    inner
                        .run_remote(OperationKind::StopWatching, None, &token, || {
                            inner.remote.stop_watching(&cid)
                        })
                        .await?;
                    inner.sessions.unwatch(&cid);
                    info!(cid = %cid, "stopped watching channel");
                    Ok(OperationResult::Done)
                })
            }
            ValidOperation::QueryChannels { request } => {
                self.remote_only(OperationKind::QueryChannels, move |inner, token| async move {
                    let states = inner
                        .run_remote(OperationKind::QueryChannels, None, &token, || {
                            inner.remote.query_channels(&request)
                        })
                        .await?;
                    let mut stored = Vec::with_capacity(states.len());
                    for state in states {
                        let state = inner.store_channel_state(state)?;
                        inner.sessions.watch(&state.channel.cid);
                        inner
                            .sessions
                            .with_session(&state.channel.cid, |s| s.apply_state(&state));
                        stored.push(state);
                    }
                    debug!(channels = stored.len(), offset = request.offset, "queried channels");
                    Ok(OperationResult::Channels(stored))
                })
            }
            ValidOperation::LoadOlderMessages { cid, page } => {
                self.remote_only(OperationKind::LoadOlderMessages, move |inner, token| async move {
                    let messages = inner
                        .run_remote(OperationKind::LoadOlderMessages, None, &token, || {
                            inner.remote.load_messages(&cid, &page)
                        })
                        .await?;
                    let messages = inner.store_remote_messages(messages)?;
                    inner.sessions.with_session(&cid, |s| {
                        s.prepend_page(page.parent_id.as_deref(), messages.clone(), page.limit)
                    });
                    Ok(OperationResult::Messages(messages))
                })
            }
            ValidOperation::ShowChannel { cid } => {
                self.remote_only(OperationKind::ShowChannel, move |inner, token| async move {
                    inner
                        .run_remote(OperationKind::ShowChannel, None, &token, || {
                            inner.remote.show_channel(&cid)
                        })
                        .await?;
                    if let Some(mut channel) = inner.store.channel(&cid) {
                        channel.hidden = false;
                        channel.version = inner.store.next_version();
                        inner.store.upsert_channel(&channel)?;
                    }
                    inner.sessions.with_session(&cid, |s| s.hidden = false);
                    Ok(OperationResult::Done)
                })
            }
            ValidOperation::LeaveChannel { cid } => {
                self.remote_only(OperationKind::LeaveChannel, move |inner, token| async move {
                    let me = vec![inner.user_id().to_string()];
                    inner
                        .run_remote(OperationKind::LeaveChannel, None, &token, || {
                            inner.remote.remove_members(&cid, &me)
                        })
                        .await?;
                    if let Some(mut channel) = inner.store.channel(&cid) {
                        channel.members.retain(|m| m.user_id != me[0]);
                        channel.version = inner.store.next_version();
                        inner.store.upsert_channel(&channel)?;
                    }
                    inner.sessions.unwatch(&cid);
                    info!(cid = %cid, "left channel");
                    Ok(OperationResult::Done)
                })
            }
            ValidOperation::DeleteChannel { cid } => {
                self.remote_only(OperationKind::DeleteChannel, move |inner, token| async move {
                    let channel = inner
                        .run_remote(OperationKind::DeleteChannel, None, &token, || {
                            inner.remote.delete_channel(&cid)
                        })
                        .await?;
                    let deleted_at = channel.deleted_at.unwrap_or_else(chrono::Utc::now);
                    inner.confirm_channel(channel)?;
                    match inner.store.delete_channel(&cid, deleted_at, inner.store.next_version()) {
                        Ok(_) | Err(ChatError::NotFound { .. }) => {}
                        Err(error) => return Err(error),
                    }
                    inner.sessions.unwatch(&cid);
                    info!(cid = %cid, "deleted channel");
                    Ok(OperationResult::Done)
                })
            }
            ValidOperation::SearchMessages { request } => {
                self.remote_only(OperationKind::SearchMessages, move |inner, token| async move {
                    let messages = inner
                        .run_remote(OperationKind::SearchMessages, None, &token, || {
                            inner.remote.search_messages(&request)
                        })
                        .await?;
                    Ok(OperationResult::Messages(messages))
                })
            }
        }
    }

    /// Spawn work on the scope under a token `cancel_all` can reach
    pub(crate) fn launch<F, Fut>(self: &Arc<Self>, work: F) -> Call<OperationResult>
    where
        F: FnOnce(Arc<Self>, CancelToken) -> Fut,
        Fut: Future<Output = ChatResult<OperationResult>> + Send + 'static,
    {
        let inner = self.clone();
        self.scope.call(move |token| {
            let key = inner.next_token.fetch_add(1, Ordering::SeqCst);
            inner.tokens.lock().insert(key, token.clone());
            let work = work(inner.clone(), token);
            async move {
                let result = work.await;
                inner.tokens.lock().remove(&key);
                result
            }
        })
    }

    fn remote_only<F, Fut>(self: &Arc<Self>, kind: OperationKind, work: F) -> Call<OperationResult>
    where
        F: FnOnce(Arc<Self>, CancelToken) -> Fut,
        Fut: Future<Output = ChatResult<OperationResult>> + Send + 'static,
    {
        if !self.is_online() {
            debug!(%kind, "offline, not reaching the remote");
            return Call::failed(&self.scope, ChatError::network("client is offline"));
        }
        self.launch(work)
    }

    /// Run one remote call under the retry policy
    ///
    /// `attempt` is invoked once per try; the optimistic write is never repeated.
    pub(crate) async fn run_remote<T, F, Fut>(
        &self,
        kind: OperationKind,
        mutation_id: Option<Uuid>,
        token: &CancelToken,
        mut attempt: F,
    ) -> ChatResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChatResult<T>>,
    {
        let mut number = 1u32;
        loop {
            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            if let Some(id) = &mutation_id {
                self.pending.start_attempt(id, number);
            }
            let error = match attempt().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if token.is_cancelled() {
                return Err(ChatError::Cancelled);
            }
            let decision = self.policy.decide(number, &error, kind);
            if !decision.should_retry {
                return Err(error);
            }
            warn!(
                %kind,
                attempt = number,
                delay_ms = decision.delay.as_millis() as u64,
                %error,
                "remote call failed, retrying"
            );
            if let Some(id) = &mutation_id {
                self.pending.retry_scheduled(id, &error);
            }
            if !token.sleep(decision.delay).await {
                return Err(ChatError::Cancelled);
            }
            number += 1;
        }
    }

    fn keystroke(self: &Arc<Self>, cid: ChannelId, parent_id: Option<String>) -> Call<OperationResult> {
        // offline keystrokes leave the throttle untouched
        if !self.is_online() {
            return Call::ready(&self.scope, OperationResult::Typing { sent: false });
        }
        let window = Duration::from_millis(self.config.keystroke_window_ms);
        let send = self.sessions.with_session_or_create(&cid, |s| {
            s.should_send_keystroke(parent_id.as_deref(), Instant::now(), window)
        });
        if !send {
            debug!(cid = %cid, "keystroke throttled");
            return Call::ready(&self.scope, OperationResult::Typing { sent: false });
        }
        self.send_typing(OperationKind::Keystroke, cid, parent_id)
    }

    fn stop_typing(self: &Arc<Self>, cid: ChannelId, parent_id: Option<String>) -> Call<OperationResult> {
        if !self.is_online() {
            return Call::ready(&self.scope, OperationResult::Typing { sent: false });
        }
        let outstanding = self
            .sessions
            .with_session(&cid, |s| s.take_outstanding_typing(parent_id.as_deref()))
            .unwrap_or(false);
        if !outstanding {
            return Call::ready(&self.scope, OperationResult::Typing { sent: false });
        }
        self.send_typing(OperationKind::StopTyping, cid, parent_id)
    }

    fn send_typing(
        self: &Arc<Self>,
        kind: OperationKind,
        cid: ChannelId,
        parent_id: Option<String>,
    ) -> Call<OperationResult> {
        self.launch(move |inner, token| async move {
            let result = inner
                .run_remote(kind, None, &token, || {
                    inner.typing_once(kind, &cid, parent_id.as_deref())
                })
                .await;
            match result {
                Ok(()) => Ok(OperationResult::Typing { sent: true }),
                Err(error) => {
                    warn!(cid = %cid, %kind, %error, "typing event dropped");
                    Ok(OperationResult::Typing { sent: false })
                }
            }
        })
    }

    async fn typing_once(&self, kind: OperationKind, cid: &ChannelId, parent_id: Option<&str>) -> ChatResult<()> {
        match kind {
            OperationKind::StopTyping => self.remote.stop_typing(cid, parent_id).await,
            _ => self.remote.keystroke(cid, parent_id).await,
        }
    }

    fn mark_all_read(self: &Arc<Self>) -> Call<OperationResult> {
        let mutation_id = self
            .pending
            .begin(OperationKind::MarkAllRead, None, None, None);
        self.launch(move |inner, token| async move {
            let cids = inner.sessions.watched();
            let this = &inner;
            let updates = join_all(
                cids.iter()
                    .map(move |cid| async move { (cid, this.local_mark_read(cid)) }),
            )
            .await;

            let mut changed = 0;
            for (cid, update) in updates {
                match update {
                    Ok(Some(_)) => changed += 1,
                    Ok(None) => {}
                    Err(error) => warn!(cid = %cid, %error, "local mark read failed"),
                }
            }
            debug!(channels = changed, "local read markers updated");

            if !inner.is_online() {
                inner.pending.release(&mutation_id);
                return Ok(OperationResult::MarkedAllRead { channels: changed });
            }
            let result = inner
                .run_remote(OperationKind::MarkAllRead, Some(mutation_id), &token, || {
                    inner.remote.mark_all_read()
                })
                .await;
            inner.settle(
                mutation_id,
                None,
                OperationKind::MarkAllRead,
                result.map(|()| OperationResult::MarkedAllRead { channels: changed }),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::loopback::{FailurePlan, LoopbackRemote};
    use crate::shared::config::RetryConfig;
    use crate::shared::messaging::SyncStatus;
    use assert_matches::assert_matches;

    fn coordinator_with(remote: Arc<LoopbackRemote>) -> Coordinator {
        let config = AppConfig::builder()
            .user_id("alice")
            .retry(RetryConfig {
                max_attempts: 3,
                base_delay_ms: 100,
                max_delay_ms: 1_000,
                jitter: 0.0,
            })
            .build()
            .unwrap();
        Coordinator::builder()
            .config(config)
            .remote(remote)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_builder_requires_remote() {
        let result = Coordinator::builder().build();
        assert_matches!(result, Err(ChatError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_send_message_round_trip() {
        let remote = Arc::new(LoopbackRemote::new());
        let coordinator = coordinator_with(remote.clone());

        let call = coordinator.submit(Operation::send_message("messaging:1", "hello"));
        let message = call.execute().await.unwrap().into_message().unwrap();

        assert_eq!(message.sync_status, SyncStatus::Synced);
        assert!(message.created_at.is_some());
        assert_eq!(remote.calls(OperationKind::SendMessage), 1);
        assert!(coordinator.pending().is_empty());
        assert_eq!(coordinator.pending().stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_offline_read_fails_fast() {
        let remote = Arc::new(LoopbackRemote::new());
        let coordinator = coordinator_with(remote.clone());
        coordinator.set_online(false).await;

        let result = coordinator.submit(Operation::watch("messaging:1", 20)).execute().await;
        assert_matches!(result, Err(ChatError::Network { .. }));
        assert_eq!(remote.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_retry_delay() {
        let remote = Arc::new(LoopbackRemote::with_plan(FailurePlan::new().fail_always(
            OperationKind::SendMessage,
            ChatError::network("down"),
        )));
        let coordinator = coordinator_with(remote.clone());

        let call = Arc::new(coordinator.submit(Operation::send_message("messaging:1", "hi")));
        let waiter = {
            let call = call.clone();
            tokio::spawn(async move { call.execute().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(coordinator.cancel_all(), 1);
        assert_matches!(waiter.await.unwrap(), Err(ChatError::Cancelled));

        // the work finalizes on its own once it sees the token
        tokio::time::sleep(Duration::from_millis(10)).await;
        let cid = ChannelId::parse("messaging:1").unwrap();
        let state = coordinator.store().read_channel_state(&cid).unwrap();
        assert_eq!(state.messages[0].sync_status, SyncStatus::FailedPermanently);
        assert_eq!(remote.calls(OperationKind::SendMessage), 1);
        assert_eq!(coordinator.pending().stats().failed_permanent, 1);
    }

    #[tokio::test]
    async fn test_keystroke_throttled_and_stop_typing() {
        let remote = Arc::new(LoopbackRemote::new());
        let coordinator = coordinator_with(remote.clone());

        let first = coordinator.submit(Operation::keystroke("messaging:1")).execute().await;
        let second = coordinator.submit(Operation::keystroke("messaging:1")).execute().await;
        assert_eq!(first, Ok(OperationResult::Typing { sent: true }));
        assert_eq!(second, Ok(OperationResult::Typing { sent: false }));

        let stop = coordinator.submit(Operation::stop_typing("messaging:1")).execute().await;
        let again = coordinator.submit(Operation::stop_typing("messaging:1")).execute().await;
        assert_eq!(stop, Ok(OperationResult::Typing { sent: true }));
        assert_eq!(again, Ok(OperationResult::Typing { sent: false }));

        assert_eq!(remote.calls(OperationKind::Keystroke), 1);
        assert_eq!(remote.calls(OperationKind::StopTyping), 1);
    }

    #[tokio::test]
    async fn test_offline_keystroke_leaves_throttle_alone() {
        let remote = Arc::new(LoopbackRemote::new());
        let coordinator = coordinator_with(remote.clone());
        coordinator.set_online(false).await;

        let offline = coordinator.submit(Operation::keystroke("messaging:1")).execute().await;
        assert_eq!(offline, Ok(OperationResult::Typing { sent: false }));

        // nothing was started, so there is nothing to stop
        coordinator.set_online(true).await;
        let stop = coordinator.submit(Operation::stop_typing("messaging:1")).execute().await;
        assert_eq!(stop, Ok(OperationResult::Typing { sent: false }));

        let online = coordinator.submit(Operation::keystroke("messaging:1")).execute().await;
        assert_eq!(online, Ok(OperationResult::Typing { sent: true }));
        assert_eq!(remote.calls(OperationKind::Keystroke), 1);
        assert_eq!(remote.calls(OperationKind::StopTyping), 0);
    }

    #[tokio::test]
    async fn test_typing_failure_is_swallowed() {
        let remote = Arc::new(LoopbackRemote::with_plan(FailurePlan::new().fail_always(
            OperationKind::Keystroke,
            ChatError::network("down"),
        )));
        let coordinator = coordinator_with(remote.clone());

        let result = coordinator.submit(Operation::keystroke("messaging:1")).execute().await;
        assert_eq!(result, Ok(OperationResult::Typing { sent: false }));
        assert_eq!(remote.calls(OperationKind::Keystroke), 1);
    }
}
