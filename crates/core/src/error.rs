//! Error types for keyspan
//!
//! This module defines every error surfaced by the storage and indexing
//! layers. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Errors fall into three groups:
//! - Definition errors (`Construction`, `IndexNotFound`, `IndexTypeMismatch`,
//!   `Unsupported`): caller mistakes, detected before or instead of store access
//! - Consistency errors (`ConsistencyViolation`): the index has already
//!   desynchronized from its primary collection; never retried
//! - Store-layer errors (`Timeout`, `Cancelled`, `TransactionAborted`, ...):
//!   passed through unchanged, retry policy belongs to the caller

use std::time::Duration;
use thiserror::Error;

/// Result type alias for keyspan operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for keyspan
#[derive(Debug, Error)]
pub enum Error {
    /// Index definition could not be constructed (empty name, unknown
    /// property, duplicate name within one collection)
    #[error("Invalid index definition: {0}")]
    Construction(String),

    /// Query referenced an index name that is not declared
    #[error("Index '{name}' not found")]
    IndexNotFound {
        /// Requested index name
        name: String,
    },

    /// Query used an index with the wrong kind or projected value type
    #[error("Index '{name}' is declared as {declared}, not {requested}")]
    IndexTypeMismatch {
        /// Index name
        name: String,
        /// What the index was declared as
        declared: String,
        /// What the caller asked for
        requested: String,
    },

    /// Maintenance found the index out of sync with the primary collection
    #[error("Index '{index}' is inconsistent with its primary collection: {detail}")]
    ConsistencyViolation {
        /// Index name
        index: String,
        /// Description of the missing posting
        detail: String,
    },

    /// Operation is not supported by the current configuration
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// `add` on a key that already exists
    #[error("Key already exists: {0}")]
    KeyExists(String),

    /// A registry name is bound to a store with different key/value types
    #[error("Store '{name}' exists with different key/value types")]
    StoreTypeMismatch {
        /// Store name
        name: String,
    },

    /// Operation did not complete within its timeout
    #[error("Operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        /// Operation that timed out
        operation: &'static str,
        /// Configured timeout
        timeout: Duration,
    },

    /// Operation observed a fired cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Commit validation failed (first-committer-wins)
    #[error("Transaction aborted: {reason}")]
    TransactionAborted {
        /// Human-readable reason
        reason: String,
    },

    /// Transaction was used after commit or abort
    #[error("Transaction is not active (state: {state})")]
    TransactionNotActive {
        /// State the transaction is in
        state: String,
    },

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Construct a definition error
    pub fn construction(msg: impl Into<String>) -> Self {
        Error::Construction(msg.into())
    }

    /// Construct a consistency violation for `index`
    pub fn consistency(index: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::ConsistencyViolation {
            index: index.into(),
            detail: detail.into(),
        }
    }

    /// Construct an unsupported-configuration error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// True for errors the caller may resolve by retrying the whole transaction
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransactionAborted { .. } | Error::Timeout { .. })
    }
}
