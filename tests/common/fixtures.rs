//! Test fixtures
//!
//! Coordinators wired to a [`LoopbackRemote`], with fast deterministic retry
//! settings (no jitter) so paused-time tests can reason about delays.

use std::sync::Arc;
use xfchat::offline::{Coordinator, FailurePlan, LoopbackRemote};
use xfchat::shared::messaging::{Channel, ChannelId, ChatMessage, Member, SyncStatus};
use xfchat::shared::{AppConfig, RetryConfig};

pub const USER: &str = "alice";

/// Retry settings: `max_attempts` attempts, 100ms doubling up to 1s
pub fn retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        jitter: 0.0,
    }
}

pub fn config(max_attempts: u32) -> AppConfig {
    AppConfig::builder()
        .user_id(USER)
        .retry(retry(max_attempts))
        .build()
        .expect("test config is valid")
}

/// Coordinator plus the remote it talks to
pub fn coordinator(plan: FailurePlan, max_attempts: u32) -> (Coordinator, Arc<LoopbackRemote>) {
    let remote = Arc::new(LoopbackRemote::with_plan(plan));
    let coordinator = Coordinator::builder()
        .config(config(max_attempts))
        .remote(remote.clone())
        .build()
        .expect("coordinator builds");
    (coordinator, remote)
}

pub fn cid(raw: &str) -> ChannelId {
    ChannelId::parse(raw).expect("valid cid")
}

/// A channel the server already knows, with `count` messages from bob
pub fn seed_channel(remote: &LoopbackRemote, raw_cid: &str, count: usize) -> Vec<ChatMessage> {
    let cid = cid(raw_cid);
    let mut channel = Channel::new(cid.clone(), "bob")
        .with_members(vec![Member::new(USER), Member::new("bob")]);
    channel.created_at = Some(chrono::Utc::now());

    let messages: Vec<ChatMessage> = (0..count)
        .map(|i| {
            let mut message = ChatMessage::new_text(cid.clone(), "bob", format!("message {}", i));
            message.id = format!("{}-m{}", cid.id(), i);
            message.created_at = Some(chrono::Utc::now() + chrono::Duration::milliseconds(i as i64));
            message.sync_status = SyncStatus::Synced;
            message
        })
        .collect();
    remote.seed_channel(channel, messages.clone());
    messages
}
