//! Session management for a two-person room
//!
//! Tracks which peer, if any, this participant is connected to and enforces
//! the capacity rule: a room holds this participant plus at most one peer.
//!
//! # Membership Flow
//!
//! ```text
//!             join(room)
//!                 |
//!        others >= 2? ----yes----> RoomFull (channel released)
//!                 |
//!                 no
//!                 v
//!   +------> Disconnected --peer joins--> Connected(peer)
//!   |                                        |   |
//!   +-------------- peer leaves -------------+   +-- third peer joins --> RoomFull error,
//!                                                    third peer ignored
//! ```

use std::time::Instant;

use crate::ROOM_CAPACITY;
use crate::error::{Result, RoomError};
use crate::types::{PeerId, RoomId};

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No peer in the room
    Disconnected,
    /// Exactly one peer connected
    Connected,
}

/// Outcome of a peer-join notification
#[derive(Debug, Clone, PartialEq)]
pub enum PeerJoin {
    /// The peer is now the connected peer
    Accepted,
    /// The peer was already the connected peer
    Duplicate,
    /// Accepting the peer would exceed the room's capacity
    Rejected(RoomError),
}

/// Membership state of one participant in one room
#[derive(Debug, Clone)]
pub struct PeerSession {
    room: RoomId,
    peer: Option<PeerId>,
    connected_at: Option<Instant>,
}

impl PeerSession {
    /// Create a session with no peer
    #[must_use]
    pub fn new(room: RoomId) -> Self {
        Self {
            room,
            peer: None,
            connected_at: None,
        }
    }

    /// Check that a participant may join a room that already holds `others`
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RoomFull`] when the room is already at capacity.
    pub fn check_capacity(room: &RoomId, others: usize) -> Result<()> {
        if others + 1 > ROOM_CAPACITY {
            return Err(RoomError::RoomFull {
                room: room.to_string(),
                participants: others,
            });
        }
        Ok(())
    }

    /// Handle a peer-join notification
    pub fn on_peer_join(&mut self, peer: PeerId) -> PeerJoin {
        match &self.peer {
            None => {
                tracing::info!("{} joined room '{}'", peer.short(), self.room);
                self.peer = Some(peer);
                self.connected_at = Some(Instant::now());
                PeerJoin::Accepted
            }
            Some(current) if *current == peer => PeerJoin::Duplicate,
            Some(current) => {
                tracing::warn!(
                    "Rejecting {} in room '{}': already connected to {}",
                    peer.short(),
                    self.room,
                    current.short()
                );
                PeerJoin::Rejected(RoomError::RoomFull {
                    room: self.room.to_string(),
                    participants: ROOM_CAPACITY,
                })
            }
        }
    }

    /// Handle a peer-leave notification
    ///
    /// Returns true if the connected peer left; departures of rejected
    /// participants do not change the session.
    pub fn on_peer_leave(&mut self, peer: &PeerId) -> bool {
        if self.peer.as_ref() != Some(peer) {
            tracing::debug!("Ignoring departure of unknown peer {}", peer.short());
            return false;
        }

        tracing::info!(
            "{} left room '{}' after {:.1}s",
            peer.short(),
            self.room,
            self.connected_for().unwrap_or_default()
        );
        self.peer = None;
        self.connected_at = None;
        true
    }

    /// True if `from` is the connected peer
    #[must_use]
    pub fn is_from_peer(&self, from: &PeerId) -> bool {
        self.peer.as_ref() == Some(from)
    }

    /// Connected peer, if any
    #[must_use]
    pub fn peer(&self) -> Option<&PeerId> {
        self.peer.as_ref()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.peer.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// True while a peer is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    /// Seconds since the current peer connected
    #[must_use]
    pub fn connected_for(&self) -> Option<f64> {
        self.connected_at.map(|at| at.elapsed().as_secs_f64())
    }

    /// Room this session belongs to
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }
}
