//! Error types for the room protocol
//!
//! Errors are split the same way the protocol treats them:
//!
//! - **Permanent**: usage or configuration errors that will not succeed on a
//!   retry (room full, unknown index, blob not yet downloaded).
//! - **Transient**: channel-level failures that a caller may choose to retry by
//!   issuing a fresh operation.
//!
//! Nothing in this crate retries on its own.
//!
//! # Example
//!
//! ```
//! use roomdrop_core::RoomError;
//!
//! fn report(err: &RoomError) -> &'static str {
//!     if err.is_permanent() { "fix the request" } else { "try again" }
//! }
//!
//! assert_eq!(report(&RoomError::FileNotFound { index: 3, available: 1 }), "fix the request");
//! ```

use std::borrow::Cow;
use thiserror::Error;

use crate::channel::Tag;
use crate::transfer::TransferStatus;

/// Errors produced by room, catalog and transfer operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoomError {
    // ============ Membership Errors ============
    /// A third participant tried to join a two-person room
    #[error("Room '{room}' is made for 2 people max ({participants} already present)")]
    RoomFull {
        /// Room name
        room: String,
        /// Participants counted when the violation was detected
        participants: usize,
    },

    /// Operation needs a connected peer
    #[error("No peer connected")]
    NotConnected,

    // ============ Catalog Errors ============
    /// Requested index is absent from the local catalog
    #[error("File not found: index {index} (local catalog holds {available} files)")]
    FileNotFound {
        /// Requested index
        index: usize,
        /// Number of local files at lookup time
        available: usize,
    },

    /// Requested index is absent from the last remote catalog
    #[error("Remote file not found: index {index} (remote catalog holds {available} files)")]
    RemoteFileNotFound {
        /// Requested index
        index: usize,
        /// Number of remote files at lookup time
        available: usize,
    },

    /// File exceeds the configured size limit
    #[error("File '{name}' is {size} bytes, limit is {limit} bytes")]
    FileTooLarge {
        /// File name
        name: String,
        /// File size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    // ============ Transfer Errors ============
    /// Content was retrieved before the transfer completed
    #[error("Blob not available for index {index}: transfer is {status}")]
    BlobNotAvailable {
        /// Remote catalog index
        index: usize,
        /// Transfer status at retrieval time
        status: TransferStatus,
    },

    // ============ Channel Errors ============
    /// A tag already has its single consumer
    #[error("Tag '{0}' already has a subscriber")]
    AlreadySubscribed(Tag),

    /// Channel send/receive failure
    #[error("Channel error: {0}")]
    Channel(Cow<'static, str>),

    /// Channel was released
    #[error("Channel closed")]
    Closed,

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    // ============ I/O, Configuration & State Errors ============
    /// Reading local file content failed
    #[error("File I/O error: {0}")]
    Io(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Invalid state for the requested operation
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),
}

impl RoomError {
    /// Returns true if a fresh attempt may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, RoomError::Channel(_) | RoomError::Io(_))
    }

    /// Returns true if the error is a usage or configuration error
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RoomError::RoomFull { .. }
                | RoomError::FileNotFound { .. }
                | RoomError::RemoteFileNotFound { .. }
                | RoomError::FileTooLarge { .. }
                | RoomError::BlobNotAvailable { .. }
                | RoomError::AlreadySubscribed(_)
                | RoomError::InvalidConfig(_)
                | RoomError::InvalidState(_)
        )
    }

    /// Returns true if the session can no longer make progress
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, RoomError::RoomFull { .. } | RoomError::Closed)
    }

    /// Create a channel error with static context (zero allocation)
    #[must_use]
    pub const fn channel(context: &'static str) -> Self {
        RoomError::Channel(Cow::Borrowed(context))
    }

    /// Create a serialization error with static context (zero allocation)
    #[must_use]
    pub const fn serialization(context: &'static str) -> Self {
        RoomError::Serialization(Cow::Borrowed(context))
    }

    /// Create an invalid configuration error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        RoomError::InvalidConfig(Cow::Borrowed(context))
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        RoomError::InvalidState(Cow::Borrowed(context))
    }
}

impl From<std::io::Error> for RoomError {
    fn from(err: std::io::Error) -> Self {
        RoomError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RoomError {
    fn from(err: serde_json::Error) -> Self {
        RoomError::Serialization(Cow::Owned(err.to_string()))
    }
}

/// Result type for room operations
pub type Result<T> = std::result::Result<T, RoomError>;
