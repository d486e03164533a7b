//! # Offline-First Chat Core
//!
//! Optimistic mutations against a local store, reconciled with a remote chat
//! API in the background.
//!
//! ## Architecture
//!
//! - **Coordinator**: validates operations, applies them locally, drives the remote
//! - **Optimistic Writes**: local effects visible before the remote answers
//! - **Reconciliation**: folds remote outcomes and server state into the store
//! - **Retry Logic**: backoff between attempts, budget per operation
//! - **Sessions**: per-channel watch state, threads, read markers and typing
//!
//! ## Key Components
//!
//! - `call.rs`: single-use deferred calls and their cancellation
//! - `operation.rs`: the operation vocabulary and its validation
//! - `coordinator.rs`: submit, retry loop, online status
//! - `optimistic.rs`: local writes at submit time
//! - `reconciliation.rs`: server copies, failure marking, reconnect sweep
//! - `pending.rs`: in-flight mutation tracking
//! - `retry.rs`: retry policy and backoff strategies
//! - `session.rs`: channel and thread sessions
//! - `events.rs`: real-time events from the remote
//! - `remote.rs` / `loopback.rs`: the remote API and its in-memory implementation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfchat::offline::{Coordinator, LoopbackRemote, Operation};
//!
//! # async fn example() -> xfchat::shared::ChatResult<()> {
//! let coordinator = Coordinator::builder()
//!     .remote(Arc::new(LoopbackRemote::new()))
//!     .build()?;
//!
//! coordinator.set_online(false).await;
//! // written locally as SyncNeeded, resolves right away
//! coordinator
//!     .submit(Operation::send_message("messaging:general", "Hello offline!"))
//!     .execute()
//!     .await?;
//!
//! // pushes everything that was written while offline
//! let sweep = coordinator.set_online(true).await;
//! assert_eq!(sweep.synced, 1);
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod coordinator;
pub mod events;
pub mod loopback;
pub mod operation;
pub mod optimistic;
pub mod pending;
pub mod reconciliation;
pub mod remote;
pub mod retry;
pub mod session;

// Re-export main types
pub use call::{Call, CancelToken, Scope};
pub use coordinator::{Coordinator, CoordinatorBuilder};
pub use loopback::{FailurePlan, LoopbackRemote};
pub use operation::{
    ChannelFilter, ChannelSort, MessagePage, Operation, OperationKind, OperationResult,
    QueryChannelsRequest, SearchRequest,
};
pub use pending::{MutationStatus, PendingMutation, PendingRegistry, PendingStats};
pub use reconciliation::RetrySweep;
pub use remote::{ChannelState, RemoteClient};
pub use retry::{BackoffStrategy, DefaultRetryPolicy, RetryDecision, RetryPolicy};
pub use session::{ChannelSession, SessionRegistry, ThreadSession, WatchState};
