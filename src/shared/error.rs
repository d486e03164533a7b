//! Shared Error Types
//!
//! This module defines the error taxonomy used by every layer of the chat core:
//! the call abstraction, the local store, the retry policy and the mutation
//! coordinator all speak `ChatError`.
//!
//! # Error Categories
//!
//! - `Validation` - malformed input, surfaced synchronously and never retried
//! - `Network` - transient transport failure, retryable
//! - `Server` - remote failure; 5xx and 429 are retryable, other statuses are not
//! - `Auth` - authentication failure, never retried
//! - `NotFound` - the remote or the local store does not know the entity
//! - `Cancelled` - caller initiated, terminal
//! - `Store` - the local store refused a write
//!
//! # Usage
//!
//! ```rust
//! use xfchat::shared::error::ChatError;
//!
//! let error = ChatError::validation("cid", "channel id must look like type:id");
//! assert!(error.is_permanent());
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync + Clone` so a single failure can be handed
//! to both the awaiting caller and the store observers.
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across the crate
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors produced by the chat core
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Malformed input
    #[error("Validation error in field '{field}': {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },

    /// Transport-level failure (timeouts, connection resets, offline)
    #[error("Network error: {message}")]
    Network {
        /// Human-readable error message
        message: String,
    },

    /// The remote answered with an error status
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP-like status code
        status: u16,
        /// Human-readable error message
        message: String,
    },

    /// Authentication or authorization failure
    #[error("Authentication error: {message}")]
    Auth {
        /// Human-readable error message
        message: String,
    },

    /// Entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind ("message", "channel", ...)
        entity: String,
        /// Identifier that was looked up
        id: String,
    },

    /// The call was cancelled by its owner
    #[error("Operation cancelled")]
    Cancelled,

    /// The local store rejected a write
    #[error("Local store error: {message}")]
    Store {
        /// Human-readable error message
        message: String,
    },

    /// `execute`/`enqueue` was invoked on a call that already ran
    #[error("Call has already been executed or enqueued")]
    CallAlreadyConsumed,

    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// A task panicked or was aborted by the runtime
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message
        message: String,
    },
}

/// Coarse classification of a `ChatError`, used by retry policies and audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Network,
    Server,
    Auth,
    NotFound,
    Cancelled,
    Store,
    Internal,
}

impl ChatError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new server error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a new store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Network { .. } => ErrorKind::Network,
            Self::Server { .. } => ErrorKind::Server,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Store { .. } => ErrorKind::Store,
            Self::CallAlreadyConsumed | Self::Serialization { .. } | Self::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether another attempt could succeed without the caller changing anything
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Inverse of [`ChatError::is_retryable`]
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::store(format!("I/O error: {}", err))
    }
}
