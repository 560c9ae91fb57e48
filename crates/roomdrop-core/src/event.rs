//! Events surfaced by a room

use std::fmt;

use crate::error::RoomError;
use crate::transfer::FailureReason;
use crate::types::{FileDescriptor, PeerId};

/// How a presentation layer should show an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Something the user asked for worked
    Success,
    /// Routine activity
    Info,
    /// Something went away or was cut short
    Warning,
    /// A protocol or usage error
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Outcome of one handled notification
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// The peer joined and was accepted
    PeerJoined(PeerId),

    /// The connected peer left; its catalog is gone
    PeerLeft(PeerId),

    /// The peer's catalog was replaced
    RemoteCatalogUpdated(Vec<FileDescriptor>),

    /// Download progress for a remote index
    DownloadProgress {
        /// Remote catalog index
        index: usize,
        /// Percent received
        percent: u8,
    },

    /// Download finished; the blob can be retrieved
    DownloadComplete {
        /// Remote catalog index
        index: usize,
        /// Name of the requested file, if it was requested
        name: Option<String>,
        /// Content length in bytes
        size: usize,
    },

    /// An outstanding download ended without content
    TransferFailed {
        /// Remote catalog index
        index: usize,
        /// Why it ended
        reason: FailureReason,
    },

    /// A local file was sent in answer to a request
    FileServed {
        /// Local catalog index
        index: usize,
        /// File name
        name: String,
        /// Bytes sent
        size: u64,
    },

    /// An error detected while handling a notification
    Error(RoomError),
}

impl RoomEvent {
    /// Severity for presentation
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::PeerJoined(_) | Self::DownloadComplete { .. } => Severity::Success,
            Self::RemoteCatalogUpdated(_)
            | Self::DownloadProgress { .. }
            | Self::FileServed { .. } => Severity::Info,
            Self::PeerLeft(_) | Self::TransferFailed { .. } => Severity::Warning,
            Self::Error(_) => Severity::Error,
        }
    }
}

impl fmt::Display for RoomEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerJoined(peer) => write!(f, "Peer {} joined", peer.short()),
            Self::PeerLeft(peer) => write!(f, "Peer {} left", peer.short()),
            Self::RemoteCatalogUpdated(files) => {
                write!(f, "Peer shares {} file(s)", files.len())
            }
            Self::DownloadProgress { index, percent } => {
                write!(f, "Download #{index}: {percent}%")
            }
            Self::DownloadComplete { index, name, size } => match name {
                Some(name) => write!(f, "Downloaded {name} ({size} bytes)"),
                None => write!(f, "Downloaded #{index} ({size} bytes)"),
            },
            Self::TransferFailed { index, reason } => {
                write!(f, "Download #{index} failed: {reason}")
            }
            Self::FileServed { name, size, .. } => write!(f, "Sent {name} ({size} bytes)"),
            Self::Error(err) => write!(f, "{err}"),
        }
    }
}
