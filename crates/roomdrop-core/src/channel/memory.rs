//! In-process channel for tests and local demos
//!
//! [`MemoryHub`] plays the part of the signaling service and the transport at
//! once: participants that connect to the same room name are wired together,
//! see each other's presence, and exchange messages through unbounded queues.
//!
//! The hub does not enforce room capacity. That is the room protocol's job,
//! and a hub that lets a third participant in is what exercises it.
//!
//! Deliveries that arrive before a tag is subscribed are held back and
//! flushed to the subscriber in order, so a freshly joined participant does
//! not lose the catalog its peer sent while it was still wiring up.
//!
//! Payloads sent with metadata are preceded by progress events: one per
//! `chunk_size` slice, with fractions `1/n, 2/n, ..., 1.0`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{
    Connector, Delivery, Metadata, PeerChannel, Presence, PresenceReceiver, Tag, TagReceiver,
};
use crate::error::{Result, RoomError};
use crate::types::{PeerId, RoomId};

/// Default slice size for progress reporting (16 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// In-memory channel configuration
#[derive(Debug, Clone)]
pub struct MemoryChannelConfig {
    /// Bytes per simulated transmission slice
    pub chunk_size: usize,
}

impl Default for MemoryChannelConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MemoryChannelConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] for a zero chunk size.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RoomError::invalid_config("chunk_size must be non-zero"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Inbox {
    tags: HashMap<Tag, mpsc::UnboundedSender<Delivery>>,
    backlog: HashMap<Tag, VecDeque<Delivery>>,
    presence: Option<mpsc::UnboundedSender<Presence>>,
    presence_taken: bool,
    presence_backlog: VecDeque<Presence>,
}

impl Inbox {
    fn deliver(&mut self, tag: Tag, delivery: Delivery) {
        if let Some(tx) = self.tags.get(&tag) {
            if let Err(mpsc::error::SendError(delivery)) = tx.send(delivery) {
                // Receiver dropped without unsubscribing
                self.tags.remove(&tag);
                self.backlog.entry(tag).or_default().push_back(delivery);
            }
            return;
        }
        self.backlog.entry(tag).or_default().push_back(delivery);
    }

    fn notify(&mut self, presence: Presence) {
        match &self.presence {
            Some(tx) => {
                let _ = tx.send(presence);
            }
            None => self.presence_backlog.push_back(presence),
        }
    }
}

struct Member {
    id: PeerId,
    inbox: Mutex<Inbox>,
}

impl Member {
    fn with_inbox<R>(&self, f: impl FnOnce(&mut Inbox) -> R) -> R {
        let mut inbox = self
            .inbox
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut inbox)
    }
}

type Rooms = DashMap<String, Vec<Arc<Member>>>;

/// In-process rendezvous point
#[derive(Clone, Default)]
pub struct MemoryHub {
    rooms: Arc<Rooms>,
    config: MemoryChannelConfig,
}

impl MemoryHub {
    /// Create a hub with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hub with custom configuration
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] if the configuration is invalid.
    pub fn with_config(config: MemoryChannelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rooms: Arc::new(DashMap::new()),
            config,
        })
    }

    /// Number of participants currently in `room`
    #[must_use]
    pub fn participants(&self, room: &RoomId) -> usize {
        self.rooms.get(room.as_str()).map_or(0, |m| m.len())
    }

    /// Join `room` with a fresh peer identifier
    ///
    /// # Errors
    ///
    /// Fails if no identifier can be generated.
    pub fn join(&self, room: &RoomId) -> Result<MemoryChannel> {
        let member = Arc::new(Member {
            id: PeerId::generate()?,
            inbox: Mutex::new(Inbox::default()),
        });

        {
            let mut members = self.rooms.entry(room.as_str().to_string()).or_default();
            for existing in members.iter() {
                existing.with_inbox(|inbox| inbox.notify(Presence::Joined(member.id.clone())));
                member.with_inbox(|inbox| inbox.notify(Presence::Joined(existing.id.clone())));
            }
            members.push(Arc::clone(&member));
        }

        tracing::debug!(
            "Peer {} joined memory room '{}' ({} present)",
            member.id.short(),
            room,
            self.participants(room)
        );

        Ok(MemoryChannel {
            rooms: Arc::clone(&self.rooms),
            room: room.clone(),
            member,
            chunk_size: self.config.chunk_size,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Connector for MemoryHub {
    type Channel = MemoryChannel;

    async fn connect(&self, room: &RoomId) -> Result<MemoryChannel> {
        self.join(room)
    }
}

/// One participant's end of a [`MemoryHub`] room
pub struct MemoryChannel {
    rooms: Arc<Rooms>,
    room: RoomId,
    member: Arc<Member>,
    chunk_size: usize,
    closed: AtomicBool,
}

impl MemoryChannel {
    /// Room this channel belongs to
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    fn recipients(&self, target: Option<&PeerId>) -> Vec<Arc<Member>> {
        self.rooms
            .get(self.room.as_str())
            .map(|members| {
                members
                    .iter()
                    .filter(|m| m.id != self.member.id)
                    .filter(|m| target.is_none_or(|t| &m.id == t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn progress_fractions(&self, len: usize) -> Vec<f64> {
        let slices = len.div_ceil(self.chunk_size).max(1);
        (1..=slices).map(|k| k as f64 / slices as f64).collect()
    }
}

#[async_trait]
impl PeerChannel for MemoryChannel {
    fn local_peer(&self) -> &PeerId {
        &self.member.id
    }

    fn peers(&self) -> Vec<PeerId> {
        self.recipients(None).iter().map(|m| m.id.clone()).collect()
    }

    async fn send(
        &self,
        tag: Tag,
        payload: Vec<u8>,
        target: Option<&PeerId>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(RoomError::Closed);
        }

        let recipients = self.recipients(target);
        if recipients.is_empty() {
            tracing::debug!(
                "No recipient for '{}' from {} (target: {:?})",
                tag,
                self.member.id.short(),
                target.map(PeerId::short)
            );
            return Ok(());
        }

        let from = self.member.id.clone();
        let fractions = if metadata.is_some() {
            self.progress_fractions(payload.len())
        } else {
            Vec::new()
        };

        for member in recipients {
            member.with_inbox(|inbox| {
                for &fraction in &fractions {
                    inbox.deliver(
                        tag,
                        Delivery::Progress {
                            from: from.clone(),
                            fraction,
                            metadata,
                        },
                    );
                }
                inbox.deliver(
                    tag,
                    Delivery::Message {
                        from: from.clone(),
                        payload: payload.clone(),
                        metadata,
                    },
                );
            });
        }

        Ok(())
    }

    fn subscribe(&self, tag: Tag) -> Result<TagReceiver> {
        if self.is_closed() {
            return Err(RoomError::Closed);
        }

        self.member.with_inbox(|inbox| {
            if inbox.tags.get(&tag).is_some_and(|tx| !tx.is_closed()) {
                return Err(RoomError::AlreadySubscribed(tag));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            for delivery in inbox.backlog.remove(&tag).unwrap_or_default() {
                let _ = tx.send(delivery);
            }
            inbox.tags.insert(tag, tx);
            Ok(TagReceiver::new(tag, rx))
        })
    }

    fn unsubscribe(&self, tag: Tag) {
        self.member.with_inbox(|inbox| {
            inbox.tags.remove(&tag);
        });
    }

    fn presence(&self) -> Result<PresenceReceiver> {
        if self.is_closed() {
            return Err(RoomError::Closed);
        }

        self.member.with_inbox(|inbox| {
            if inbox.presence_taken {
                return Err(RoomError::invalid_state("presence already has a subscriber"));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            for presence in inbox.presence_backlog.drain(..) {
                let _ = tx.send(presence);
            }
            inbox.presence = Some(tx);
            inbox.presence_taken = true;
            Ok(PresenceReceiver::new(rx))
        })
    }

    fn leave(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut remaining = 0;
        if let Some(mut members) = self.rooms.get_mut(self.room.as_str()) {
            members.retain(|m| m.id != self.member.id);
            for other in members.iter() {
                other.with_inbox(|inbox| inbox.notify(Presence::Left(self.member.id.clone())));
            }
            remaining = members.len();
        }
        self.rooms
            .remove_if(self.room.as_str(), |_, members| members.is_empty());

        self.member.with_inbox(|inbox| {
            inbox.tags.clear();
            inbox.backlog.clear();
            inbox.presence = None;
        });

        tracing::debug!(
            "Peer {} left memory room '{}' ({} remaining)",
            self.member.id.short(),
            self.room,
            remaining
        );
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.leave();
    }
}
