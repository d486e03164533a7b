//! XFChat - Offline-First Chat Core
//!
//! XFChat is the client-side core of a chat application: it applies user
//! mutations optimistically to a local store and reconciles them with a
//! remote chat API in the background, retrying transient failures.
//!
//! # Overview
//!
//! This library provides:
//! - A versioned, idempotent local store for channels, messages, reactions and read markers
//! - A mutation coordinator with optimistic writes and reconciliation
//! - Deferred, cancellable calls bound to a concurrency scope
//! - Configurable retry with exponential backoff
//! - Channel and thread sessions with typing indicators
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared by every layer
//!   - Channel, message and reaction records
//!   - Error taxonomy, configuration, remote events
//!
//! - **`local_store`** - Synchronous offline cache
//!   - Idempotent versioned upserts, soft deletes
//!   - Change feed for observers, JSON snapshots
//!
//! - **`offline`** - The coordinator and everything around it
//!   - Operations, calls, retry policy, pending mutations
//!   - Remote client trait and an in-memory loopback implementation
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xfchat::offline::{Coordinator, LoopbackRemote, Operation};
//! use xfchat::shared::AppConfig;
//!
//! # async fn example() -> xfchat::shared::ChatResult<()> {
//! let config = AppConfig::builder().user_id("alice").build().expect("valid config");
//! let coordinator = Coordinator::builder()
//!     .config(config)
//!     .remote(Arc::new(LoopbackRemote::new()))
//!     .build()?;
//!
//! let call = coordinator.submit(Operation::send_message("messaging:general", "hello"));
//! let message = call.execute().await?.into_message();
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! - **Store**: `parking_lot` locks, writes are synchronous and never held across `.await`
//! - **Coordinator**: cheap to clone; all state behind one `Arc`
//! - **Calls**: work runs on the coordinator's tokio runtime handle
//!
//! # Error Handling
//!
//! Every fallible operation returns `ChatResult<T>` with the `ChatError`
//! taxonomy from `shared::error`; configuration has its own `ConfigError`.

/// Shared types and data structures
pub mod shared;

/// Local offline store
pub mod local_store;

/// Mutation coordinator and offline support
pub mod offline;
