//! # Pending Mutations
//!
//! Tracks every optimistic operation from the moment its local write lands
//! until the remote outcome is reconciled. Terminal entries are removed when
//! the owning call finalizes; cumulative counters survive for statistics.
//!
//! ## Features
//!
//! - **Status Tracking**: `Applying` → `AwaitingRemote` → terminal
//! - **Audit Snapshots**: the entity before and after the optimistic write
//! - **Attempt Counting**: remote attempts and the last error per mutation

use crate::offline::operation::OperationKind;
use crate::shared::error::ChatError;
use crate::shared::messaging::{Channel, ChannelId, ChannelRead, ChatMessage, Reaction};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Mutation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationStatus {
    /// Local write in progress
    Applying,
    /// Remote call in flight
    AwaitingRemote,
    /// Remote confirmed
    Succeeded,
    /// Remote failed, a retry is scheduled
    FailedRetryable,
    /// Remote refused, retries ran out, or cancelled
    FailedPermanent,
}

impl MutationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MutationStatus::Succeeded | MutationStatus::FailedPermanent)
    }
}

/// Entity state captured around an optimistic write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntitySnapshot {
    Message(ChatMessage),
    Reaction(Reaction),
    Channel(Channel),
    Read {
        cid: ChannelId,
        read: Option<ChannelRead>,
    },
}

/// An optimistic operation awaiting reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub id: Uuid,
    pub cid: Option<ChannelId>,
    pub kind: OperationKind,
    /// Stored entity before the optimistic write, if any
    pub before: Option<EntitySnapshot>,
    /// What the optimistic write stored
    pub after: Option<EntitySnapshot>,
    pub status: MutationStatus,
    /// Remote attempts made so far
    pub attempts: u32,
    pub last_error: Option<ChatError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending mutation statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingStats {
    /// Mutations currently tracked
    pub in_flight: usize,
    pub applying: usize,
    pub awaiting_remote: usize,
    /// Waiting out a retry delay
    pub failed_retryable: usize,
    /// Finished successfully since creation
    pub succeeded: u64,
    /// Finished with a permanent failure since creation
    pub failed_permanent: u64,
}

#[derive(Debug, Default)]
struct Counters {
    succeeded: u64,
    failed_permanent: u64,
}

/// Registry of in-flight optimistic mutations
#[derive(Debug, Default)]
pub struct PendingRegistry {
    mutations: RwLock<HashMap<Uuid, PendingMutation>>,
    counters: RwLock<Counters>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a mutation in `Applying`
    pub fn begin(
        &self,
        kind: OperationKind,
        cid: Option<ChannelId>,
        before: Option<EntitySnapshot>,
        after: Option<EntitySnapshot>,
    ) -> Uuid {
        let now = Utc::now();
        let mutation = PendingMutation {
            id: Uuid::new_v4(),
            cid,
            kind,
            before,
            after,
            status: MutationStatus::Applying,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        let id = mutation.id;
        self.mutations.write().insert(id, mutation);
        id
    }

    fn update(&self, id: &Uuid, f: impl FnOnce(&mut PendingMutation)) {
        if let Some(mutation) = self.mutations.write().get_mut(id) {
            f(mutation);
            mutation.updated_at = Utc::now();
        }
    }

    /// Record the optimistic state once it is written
    pub fn set_after(&self, id: &Uuid, after: EntitySnapshot) {
        self.update(id, |m| m.after = Some(after));
    }

    /// Mark a remote attempt as started
    pub fn start_attempt(&self, id: &Uuid, attempt: u32) {
        self.update(id, |m| {
            m.status = MutationStatus::AwaitingRemote;
            m.attempts = attempt;
        });
    }

    /// Mark a failed attempt that will be retried
    pub fn retry_scheduled(&self, id: &Uuid, error: &ChatError) {
        self.update(id, |m| {
            m.status = MutationStatus::FailedRetryable;
            m.last_error = Some(error.clone());
        });
    }

    /// Finalize a mutation and stop tracking it
    pub fn finish(&self, id: &Uuid, outcome: Result<(), &ChatError>) -> Option<PendingMutation> {
        let mut mutation = self.mutations.write().remove(id)?;
        mutation.updated_at = Utc::now();
        let mut counters = self.counters.write();
        match outcome {
            Ok(()) => {
                mutation.status = MutationStatus::Succeeded;
                counters.succeeded += 1;
            }
            Err(error) => {
                mutation.status = MutationStatus::FailedPermanent;
                mutation.last_error = Some(error.clone());
                counters.failed_permanent += 1;
            }
        }
        Some(mutation)
    }

    /// Stop tracking without a terminal outcome, e.g. parked for the reconnect sweep
    pub fn release(&self, id: &Uuid) -> Option<PendingMutation> {
        self.mutations.write().remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<PendingMutation> {
        self.mutations.read().get(id).cloned()
    }

    /// Tracked mutations, oldest first
    pub fn in_flight(&self) -> Vec<PendingMutation> {
        let mut mutations: Vec<PendingMutation> = self.mutations.read().values().cloned().collect();
        mutations.sort_by_key(|m| m.created_at);
        mutations
    }

    /// Tracked mutations touching a channel
    pub fn for_channel(&self, cid: &ChannelId) -> Vec<PendingMutation> {
        self.in_flight()
            .into_iter()
            .filter(|m| m.cid.as_ref() == Some(cid))
            .collect()
    }

    /// Get pending statistics
    pub fn stats(&self) -> PendingStats {
        let mutations = self.mutations.read();
        let counters = self.counters.read();
        let mut stats = PendingStats {
            in_flight: mutations.len(),
            succeeded: counters.succeeded,
            failed_permanent: counters.failed_permanent,
            ..PendingStats::default()
        };
        for mutation in mutations.values() {
            match mutation.status {
                MutationStatus::Applying => stats.applying += 1,
                MutationStatus::AwaitingRemote => stats.awaiting_remote += 1,
                MutationStatus::FailedRetryable => stats.failed_retryable += 1,
                MutationStatus::Succeeded | MutationStatus::FailedPermanent => {}
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.mutations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.read().is_empty()
    }
}
