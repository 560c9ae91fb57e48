//! # Roomdrop Core
//!
//! Two-person file exchange over a peer-to-peer messaging channel.
//!
//! Two participants join a room by name, advertise the files they are willing
//! to share, and download each other's files on demand. File content never
//! passes through a server; the channel carries everything.
//!
//! This crate provides:
//! - The [`PeerChannel`] interface the protocol runs on, plus an in-process
//!   [`MemoryHub`] for tests and demos
//! - Room membership with the two-participant capacity rule
//! - Catalog synchronization
//! - On-demand, progress-tracked transfers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Room                                   │
//! │   (session context: event loop, user operations)                │
//! ├──────────────────┬───────────────────────┬──────────────────────┤
//! │  PeerSession     │  Catalog              │  Transfers           │
//! │  (membership)    │  (local + remote)     │  (per-index state)   │
//! ├──────────────────┴───────────────────────┴──────────────────────┤
//! │                        PeerChannel                               │
//! │   (tags: local-files, request-dl, download; presence)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use roomdrop_core::{LocalFile, MemoryHub, Room, RoomConfig, RoomEvent, RoomId};
//!
//! # async fn demo() -> roomdrop_core::Result<()> {
//! let hub = MemoryHub::new();
//! let mut room = Room::join(&hub, RoomId::new("lobby")?, RoomConfig::default())
//!     .await?
//!     .into_room()?;
//!
//! room.add_file(LocalFile::from_bytes("notes.txt", b"hello".to_vec())).await?;
//!
//! while let Some(event) = room.next_event().await {
//!     if let RoomEvent::RemoteCatalogUpdated(files) = &event {
//!         if !files.is_empty() {
//!             room.request_download(0).await?;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod channel;
pub mod config;
pub mod error;
pub mod event;
pub mod room;
pub mod session;
pub mod source;
pub mod transfer;
pub mod types;

pub use catalog::{Catalog, RemoteFile};
pub use channel::{
    Connector, MemoryChannel, MemoryChannelConfig, MemoryHub, Metadata, PeerChannel, Presence,
    Tag,
};
pub use config::RoomConfig;
pub use error::{Result, RoomError};
pub use event::{RoomEvent, Severity};
pub use room::{JoinOutcome, Room};
pub use session::{PeerSession, SessionState};
pub use source::{FileSource, LocalFile};
pub use transfer::{FailureReason, TransferState, TransferStatus, Transfers};
pub use types::{Blob, FileDescriptor, PeerId, RoomId};

/// Participants a room admits, this one included
pub const ROOM_CAPACITY: usize = 2;
