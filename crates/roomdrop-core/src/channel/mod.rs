//! Peer channel abstraction
//!
//! The room protocol runs on top of a messaging channel it does not own:
//! connection establishment, NAT traversal, framing and reliability all live
//! below this interface. What the protocol needs from a channel is:
//!
//! - a set of named tags, each a FIFO stream of messages between the two peers
//! - fractional progress events while a large payload is in flight
//! - presence notifications when participants join or leave the room
//!
//! Every tag has at most one consumer. [`PeerChannel::subscribe`] hands out
//! the receiving end once; a second call fails with
//! [`RoomError::AlreadySubscribed`](crate::RoomError::AlreadySubscribed) until
//! the tag is unsubscribed.
//!
//! # Wire contract
//!
//! | Tag           | Payload                               | Metadata         |
//! |---------------|---------------------------------------|------------------|
//! | `local-files` | JSON array of `{name, size}`          | none             |
//! | `request-dl`  | JSON integer index                    | none             |
//! | `download`    | raw bytes                             | `{"index": n}`   |

pub mod action;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{PeerId, RoomId};

pub use action::{
    Action, ActionReceiver, ActionSender, CatalogMessage, DownloadRequest, FileContent, Inbound,
    Payload,
};
pub use memory::{MemoryChannel, MemoryChannelConfig, MemoryHub};

/// Named message stream between the two peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Catalog broadcast
    LocalFiles,
    /// Download request carrying a remote catalog index
    RequestDownload,
    /// File content answering a request
    Download,
}

impl Tag {
    /// All tags the protocol subscribes to
    pub const ALL: [Tag; 3] = [Tag::LocalFiles, Tag::RequestDownload, Tag::Download];

    /// Name used on the wire
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LocalFiles => "local-files",
            Self::RequestDownload => "request-dl",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to a `download` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Remote catalog index the content answers
    pub index: usize,
}

/// Something received on a tag
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A complete payload
    Message {
        /// Sending peer
        from: PeerId,
        /// Encoded payload
        payload: Vec<u8>,
        /// Optional metadata sent alongside
        metadata: Option<Metadata>,
    },
    /// Transmission progress of a payload that has not fully arrived yet
    Progress {
        /// Sending peer
        from: PeerId,
        /// Fraction received, in `[0, 1]`
        fraction: f64,
        /// Metadata of the payload in flight
        metadata: Option<Metadata>,
    },
}

/// Room membership notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    /// A participant joined the room
    Joined(PeerId),
    /// A participant left the room
    Left(PeerId),
}

/// Receiving end of a single tag
#[derive(Debug)]
pub struct TagReceiver {
    tag: Tag,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl TagReceiver {
    /// Wrap a channel queue
    #[must_use]
    pub fn new(tag: Tag, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { tag, rx }
    }

    /// Tag this receiver consumes
    #[must_use]
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Wait for the next delivery; `None` once the tag is unsubscribed or the
    /// channel is gone
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Receiving end of presence notifications
#[derive(Debug)]
pub struct PresenceReceiver {
    rx: mpsc::UnboundedReceiver<Presence>,
}

impl PresenceReceiver {
    /// Wrap a channel queue
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Presence>) -> Self {
        Self { rx }
    }

    /// Wait for the next notification
    pub async fn recv(&mut self) -> Option<Presence> {
        self.rx.recv().await
    }
}

/// Established channel scoped to one room
///
/// Implementations must deliver messages of a single tag in send order. No
/// ordering is promised across tags.
#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// Identifier the channel assigned to this participant
    fn local_peer(&self) -> &PeerId;

    /// Other participants currently in the room
    fn peers(&self) -> Vec<PeerId>;

    /// Send a payload on `tag`, to `target` or to every other participant
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Closed`](crate::RoomError::Closed) after
    /// [`leave`](Self::leave), or a channel error from the transport.
    async fn send(
        &self,
        tag: Tag,
        payload: Vec<u8>,
        target: Option<&PeerId>,
        metadata: Option<Metadata>,
    ) -> Result<()>;

    /// Take the single consumer slot of `tag`
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::AlreadySubscribed`](crate::RoomError::AlreadySubscribed)
    /// if the tag already has a consumer.
    fn subscribe(&self, tag: Tag) -> Result<TagReceiver>;

    /// Release the consumer slot of `tag`; the receiver then yields `None`
    fn unsubscribe(&self, tag: Tag);

    /// Take the single consumer slot of presence notifications
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidState`](crate::RoomError::InvalidState) if
    /// presence is already consumed.
    fn presence(&self) -> Result<PresenceReceiver>;

    /// Leave the room and release the connection; idempotent
    fn leave(&self);

    /// True once [`leave`](Self::leave) has run
    fn is_closed(&self) -> bool;
}

/// Rendezvous mechanism that turns a room name into a channel
#[async_trait]
pub trait Connector: Send + Sync {
    /// Channel type produced
    type Channel: PeerChannel + 'static;

    /// Join `room` and return the established channel
    ///
    /// # Errors
    ///
    /// Returns a channel error if the rendezvous fails.
    async fn connect(&self, room: &RoomId) -> Result<Self::Channel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_wire_names() {
        assert_eq!(Tag::LocalFiles.as_str(), "local-files");
        assert_eq!(Tag::RequestDownload.as_str(), "request-dl");
        assert_eq!(Tag::Download.as_str(), "download");
        assert_eq!(Tag::Download.to_string(), "download");
    }

    #[test]
    fn test_metadata_json() {
        let json = serde_json::to_string(&Metadata { index: 1 }).unwrap();
        assert_eq!(json, r#"{"index":1}"#);
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index, 1);
    }

    #[tokio::test]
    async fn test_tag_receiver_closes_with_sender() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut receiver = TagReceiver::new(Tag::Download, rx);
        assert_eq!(receiver.tag(), Tag::Download);

        tx.send(Delivery::Progress {
            from: PeerId::new("p"),
            fraction: 0.5,
            metadata: None,
        })
        .unwrap();
        drop(tx);

        assert!(matches!(
            receiver.recv().await,
            Some(Delivery::Progress { .. })
        ));
        assert!(receiver.recv().await.is_none());
    }
}
