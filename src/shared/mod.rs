//! Shared Module
//!
//! Types shared by every layer of the chat core: domain records, the error
//! taxonomy, remote events and configuration. Nothing in here performs I/O.

/// Real-time events received from the remote
pub mod event;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Channel, message and reaction records
pub mod messaging;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, ConfigError, RetryConfig};
pub use error::{ChatError, ChatResult, ErrorKind};
pub use event::ChatEvent;
pub use messaging::{Channel, ChannelId, ChatMessage, Reaction, SyncStatus};
