//! # Channel Sessions
//!
//! In-memory state for the conversations the client currently observes.
//! A session is created when a channel is watched and destroyed when it is
//! unwatched, left or deleted. Threads are nested sessions keyed by parent
//! message id with their own, independently paged message list.
//!
//! ## State Machine
//!
//! ```text
//! Unwatched --watch--> Watching --stop watching / leave / delete--> (dropped)
//! ```
//!
//! Typing indicators from other users expire on their own; keystroke
//! throttling and the mark-read marker for the current user live here too.

use crate::offline::remote::ChannelState;
use crate::shared::messaging::{Channel, ChannelId, ChatMessage, Member};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Whether the client is observing a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Unwatched,
    Watching,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TypingEntry {
    parent_id: Option<String>,
    expires_at: Instant,
}

fn upsert_sorted(list: &mut Vec<ChatMessage>, message: ChatMessage) {
    list.retain(|m| m.id != message.id);
    let key = (message.sort_time(), message.id.clone());
    let position = list
        .binary_search_by(|m| (m.sort_time(), m.id.clone()).cmp(&key))
        .unwrap_or_else(|p| p);
    list.insert(position, message);
}

/// Replies to one parent message
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadSession {
    pub parent_id: String,
    messages: Vec<ChatMessage>,
    /// No older replies remain on the server
    pub end_reached: bool,
}

impl ThreadSession {
    fn new(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            messages: Vec::new(),
            end_reached: false,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Id of the oldest loaded reply, the cursor for the next page
    pub fn oldest_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }
}

/// One observed conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSession {
    pub cid: ChannelId,
    pub state: WatchState,
    pub channel: Option<Channel>,
    messages: Vec<ChatMessage>,
    read_state: HashMap<String, DateTime<Utc>>,
    typing: HashMap<String, TypingEntry>,
    pub members: Vec<Member>,
    pub hidden: bool,
    threads: HashMap<String, ThreadSession>,
    outstanding_typing: HashMap<Option<String>, Instant>,
    last_mark_read: Option<DateTime<Utc>>,
    pending: HashSet<Uuid>,
}

impl ChannelSession {
    pub fn new(cid: ChannelId) -> Self {
        Self {
            cid,
            state: WatchState::Unwatched,
            channel: None,
            messages: Vec::new(),
            read_state: HashMap::new(),
            typing: HashMap::new(),
            members: Vec::new(),
            hidden: false,
            threads: HashMap::new(),
            outstanding_typing: HashMap::new(),
            last_mark_read: None,
            pending: HashSet::new(),
        }
    }

    /// Load what a watch or query returned
    pub fn apply_state(&mut self, state: &ChannelState) {
        self.channel = Some(state.channel.clone());
        self.members = state.channel.members.clone();
        self.hidden = state.channel.hidden;
        for message in &state.messages {
            self.upsert_message(message.clone());
        }
        for read in &state.reads {
            self.update_read(&read.user_id, read.last_read);
        }
    }

    /// Channel messages ordered by time, unique by id
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .chain(self.threads.values().flat_map(|t| t.messages.iter()))
            .find(|m| m.id == id)
    }

    /// Insert or replace a message; replies go to their open thread
    pub fn upsert_message(&mut self, message: ChatMessage) {
        match &message.parent_id {
            Some(parent_id) => {
                if let Some(thread) = self.threads.get_mut(parent_id) {
                    upsert_sorted(&mut thread.messages, message);
                }
            }
            None => upsert_sorted(&mut self.messages, message),
        }
    }

    /// Drop a message by id, e.g. a provisional id replaced by the server's
    pub fn remove_message(&mut self, id: &str) {
        self.messages.retain(|m| m.id != id);
        for thread in self.threads.values_mut() {
            thread.messages.retain(|m| m.id != id);
        }
    }

    /// Prepend an older page of channel or thread messages
    pub fn prepend_page(&mut self, parent_id: Option<&str>, page: Vec<ChatMessage>, limit: u32) {
        let exhausted = (page.len() as u32) < limit;
        match parent_id {
            Some(parent_id) => {
                let thread = self.open_thread(parent_id);
                thread.end_reached = exhausted;
                for message in page {
                    upsert_sorted(&mut thread.messages, message);
                }
            }
            None => {
                for message in page {
                    upsert_sorted(&mut self.messages, message);
                }
            }
        }
    }

    /// Thread session for `parent_id`, created on first use
    pub fn open_thread(&mut self, parent_id: &str) -> &mut ThreadSession {
        self.threads
            .entry(parent_id.to_string())
            .or_insert_with(|| ThreadSession::new(parent_id))
    }

    pub fn thread(&self, parent_id: &str) -> Option<&ThreadSession> {
        self.threads.get(parent_id)
    }

    /// Most recent message time, deleted messages included
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.sort_time())
    }

    /// Per-user last read timestamps
    pub fn read_state(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.read_state
    }

    /// Move a user's read marker forward; older timestamps are ignored
    pub fn update_read(&mut self, user_id: &str, at: DateTime<Utc>) -> bool {
        match self.read_state.get(user_id) {
            Some(current) if *current >= at => false,
            _ => {
                self.read_state.insert(user_id.to_string(), at);
                true
            }
        }
    }

    pub fn last_mark_read(&self) -> Option<DateTime<Utc>> {
        self.last_mark_read
    }

    pub(crate) fn set_last_mark_read(&mut self, at: DateTime<Utc>) {
        self.last_mark_read = Some(at);
    }

    pub fn set_typing(&mut self, user_id: &str, parent_id: Option<String>, expires_at: Instant) {
        self.typing.insert(
            user_id.to_string(),
            TypingEntry {
                parent_id,
                expires_at,
            },
        );
    }

    pub fn clear_typing(&mut self, user_id: &str) -> bool {
        self.typing.remove(user_id).is_some()
    }

    /// Users typing at `now`, sorted; `parent_id` selects the channel or a thread
    pub fn typing_users(&self, parent_id: Option<&str>, now: Instant) -> Vec<String> {
        let mut users: Vec<String> = self
            .typing
            .iter()
            .filter(|(_, entry)| entry.expires_at > now && entry.parent_id.as_deref() == parent_id)
            .map(|(user, _)| user.clone())
            .collect();
        users.sort();
        users
    }

    /// Drop expired typing indicators; returns the users removed
    pub fn prune_typing(&mut self, now: Instant) -> Vec<String> {
        let mut expired: Vec<String> = self
            .typing
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(user, _)| user.clone())
            .collect();
        self.typing.retain(|_, entry| entry.expires_at > now);
        expired.sort();
        expired
    }

    /// Record a keystroke; `false` when one was sent within `window`
    pub fn should_send_keystroke(&mut self, parent_id: Option<&str>, now: Instant, window: Duration) -> bool {
        let key = parent_id.map(str::to_string);
        if let Some(last) = self.outstanding_typing.get(&key) {
            if now.saturating_duration_since(*last) < window {
                return false;
            }
        }
        self.outstanding_typing.insert(key, now);
        true
    }

    /// Clear the outstanding start-typing marker; `true` if there was one
    pub fn take_outstanding_typing(&mut self, parent_id: Option<&str>) -> bool {
        self.outstanding_typing
            .remove(&parent_id.map(str::to_string))
            .is_some()
    }

    pub(crate) fn track(&mut self, mutation_id: Uuid) {
        self.pending.insert(mutation_id);
    }

    pub(crate) fn untrack(&mut self, mutation_id: &Uuid) {
        self.pending.remove(mutation_id);
    }

    /// In-flight mutations touching this channel
    pub fn pending_mutations(&self) -> usize {
        self.pending.len()
    }
}

/// All sessions of one coordinator
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ChannelId, ChannelSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a channel to `Watching`, creating its session
    pub fn watch(&self, cid: &ChannelId) {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(cid.clone())
            .or_insert_with(|| ChannelSession::new(cid.clone()));
        session.state = WatchState::Watching;
    }

    /// Destroy a session
    pub fn unwatch(&self, cid: &ChannelId) -> Option<ChannelSession> {
        self.sessions.write().remove(cid)
    }

    pub fn is_watching(&self, cid: &ChannelId) -> bool {
        self.sessions
            .read()
            .get(cid)
            .map_or(false, |s| s.state == WatchState::Watching)
    }

    /// Copy of a session
    pub fn session(&self, cid: &ChannelId) -> Option<ChannelSession> {
        self.sessions.read().get(cid).cloned()
    }

    /// Channels in `Watching` state, sorted
    pub fn watched(&self) -> Vec<ChannelId> {
        let mut cids: Vec<ChannelId> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.state == WatchState::Watching)
            .map(|s| s.cid.clone())
            .collect();
        cids.sort();
        cids
    }

    /// Mutate an existing session
    pub fn with_session<R>(&self, cid: &ChannelId, f: impl FnOnce(&mut ChannelSession) -> R) -> Option<R> {
        self.sessions.write().get_mut(cid).map(f)
    }

    /// Mutate a session, creating an unwatched one if needed
    pub fn with_session_or_create<R>(&self, cid: &ChannelId, f: impl FnOnce(&mut ChannelSession) -> R) -> R {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(cid.clone())
            .or_insert_with(|| ChannelSession::new(cid.clone()));
        f(session)
    }

    /// Drop expired typing indicators everywhere; returns how many were removed
    pub fn prune_typing(&self, now: Instant) -> usize {
        self.sessions
            .write()
            .values_mut()
            .map(|s| s.prune_typing(now).len())
            .sum()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
