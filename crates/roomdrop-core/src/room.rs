//! Joined room context and event loop
//!
//! A [`Room`] owns everything that lives for one session: the channel, the
//! membership state, both catalogs and the download table. It is created by
//! [`Room::join`] and released when dropped or when [`Room::leave`] is called.
//!
//! # Event Loop
//!
//! ```text
//!   presence ----+
//!   local-files -+
//!   request-dl --+--> next_event() --> one handler --> RoomEvent(s)
//!   download ----+
//!   stall tick --+
//! ```
//!
//! Handlers run one at a time and to completion inside
//! [`next_event`](Room::next_event). User operations take `&mut Room`, so they
//! interleave with handlers only between events.
//!
//! # Download Flow
//!
//! ```text
//! Requester                          Responder
//!     |                                  |
//!     |-- request-dl: index ------------>|
//!     |                                  |  read local file
//!     |<-- download progress (k/n) ------|
//!     |<-- download: bytes {index} ------|
//!     |                                  |
//!     |  Complete(blob)                  |
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{Catalog, RemoteFile};
use crate::channel::{
    Action, ActionReceiver, ActionSender, CatalogMessage, Connector, DownloadRequest,
    FileContent, Inbound, Metadata, PeerChannel, Presence, PresenceReceiver, Tag,
};
use crate::config::RoomConfig;
use crate::error::{Result, RoomError};
use crate::event::RoomEvent;
use crate::session::{PeerJoin, PeerSession, SessionState};
use crate::source::LocalFile;
use crate::transfer::{self, ContentOutcome, FailureReason, TransferState, Transfers};
use crate::types::{Blob, FileDescriptor, PeerId, RoomId};

/// Result of [`Room::join`]
pub enum JoinOutcome<C: PeerChannel + 'static> {
    /// Joined; the room is ready for use
    Joined(Room<C>),
    /// The room already holds two participants; the channel was released
    RoomFull {
        /// Room name
        room: RoomId,
        /// Participants found in the room
        participants: usize,
    },
}

impl<C: PeerChannel + 'static> JoinOutcome<C> {
    /// The joined room, or [`RoomError::RoomFull`]
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RoomFull`] for the `RoomFull` outcome.
    pub fn into_room(self) -> Result<Room<C>> {
        match self {
            Self::Joined(room) => Ok(room),
            Self::RoomFull { room, participants } => Err(RoomError::RoomFull {
                room: room.to_string(),
                participants,
            }),
        }
    }

    /// True for the `RoomFull` outcome
    #[must_use]
    pub fn is_full(&self) -> bool {
        matches!(self, Self::RoomFull { .. })
    }
}

enum Wake {
    Presence(Option<Presence>),
    Catalog(Option<Inbound<CatalogMessage>>),
    Request(Option<Inbound<DownloadRequest>>),
    Content(Option<Inbound<FileContent>>),
    Sweep,
}

struct Wiring<C: PeerChannel + 'static> {
    catalog_tx: ActionSender<CatalogMessage, C>,
    catalog_rx: ActionReceiver<CatalogMessage>,
    request_tx: ActionSender<DownloadRequest, C>,
    request_rx: ActionReceiver<DownloadRequest>,
    content_tx: ActionSender<FileContent, C>,
    content_rx: ActionReceiver<FileContent>,
    presence: PresenceReceiver,
}

impl<C: PeerChannel + 'static> Wiring<C> {
    fn make(channel: &Arc<C>) -> Result<Self> {
        let (catalog_tx, catalog_rx) = Action::make::<CatalogMessage, C>(channel)?;
        let (request_tx, request_rx) = Action::make::<DownloadRequest, C>(channel)?;
        let (content_tx, content_rx) = Action::make::<FileContent, C>(channel)?;
        let presence = channel.presence()?;
        Ok(Self {
            catalog_tx,
            catalog_rx,
            request_tx,
            request_rx,
            content_tx,
            content_rx,
            presence,
        })
    }
}

/// One participant's session in a two-person room
pub struct Room<C: PeerChannel + 'static> {
    channel: Arc<C>,
    session: PeerSession,
    catalog: Catalog,
    transfers: Transfers,
    wiring: Wiring<C>,
    sweep: tokio::time::Interval,
    pending: VecDeque<RoomEvent>,
    closed: bool,
}

impl<C: PeerChannel + 'static> Room<C> {
    /// Join `room` through `connector`
    ///
    /// Returns [`JoinOutcome::RoomFull`] if two participants are already
    /// present. Peers already in the room are reported through
    /// [`next_event`](Self::next_event) like later arrivals.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] for an invalid configuration and
    /// propagates connector and subscription errors.
    pub async fn join<K>(connector: &K, room: RoomId, config: RoomConfig) -> Result<JoinOutcome<C>>
    where
        K: Connector<Channel = C>,
    {
        config.validate()?;

        let channel = connector.connect(&room).await?;
        let others = channel.peers().len();
        if PeerSession::check_capacity(&room, others).is_err() {
            tracing::warn!(
                "Room '{}' already holds {} participants, leaving",
                room,
                others
            );
            channel.leave();
            return Ok(JoinOutcome::RoomFull {
                room,
                participants: others,
            });
        }

        let channel = Arc::new(channel);
        let wiring = match Wiring::make(&channel) {
            Ok(wiring) => wiring,
            Err(e) => {
                for tag in Tag::ALL {
                    channel.unsubscribe(tag);
                }
                channel.leave();
                return Err(e);
            }
        };

        let period = config.sweep_interval;
        let mut sweep = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Joined room '{}' as {}",
            room,
            channel.local_peer().short()
        );

        Ok(JoinOutcome::Joined(Self {
            session: PeerSession::new(room),
            catalog: Catalog::new(config.max_file_size),
            transfers: Transfers::new(config.stall_timeout),
            channel,
            wiring,
            sweep,
            pending: VecDeque::new(),
            closed: false,
        }))
    }

    // ============ Membership ============

    /// Room name
    #[must_use]
    pub fn room(&self) -> &RoomId {
        self.session.room()
    }

    /// This participant's identifier
    #[must_use]
    pub fn local_peer(&self) -> &PeerId {
        self.channel.local_peer()
    }

    /// Connected peer, if any
    #[must_use]
    pub fn peer(&self) -> Option<&PeerId> {
        self.session.peer()
    }

    /// Connection state
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// True while a peer is connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Leave the room and release the channel
    pub fn leave(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for tag in Tag::ALL {
            self.channel.unsubscribe(tag);
        }
        self.channel.leave();
        tracing::info!("Left room '{}'", self.session.room());
    }

    // ============ Catalog ============

    /// Add a local file and publish the updated catalog
    ///
    /// The file stays in the catalog even if publishing fails.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::FileTooLarge`] above the size limit, or the
    /// channel error from publishing.
    pub async fn add_file(&mut self, file: LocalFile) -> Result<usize> {
        let index = self.catalog.add_local(file)?;
        tracing::debug!(
            "Added local file #{} ({})",
            index,
            self.catalog.local(index)?.descriptor()
        );
        self.publish_local_catalog().await?;
        Ok(index)
    }

    /// Remove the local file at `index` and publish the updated catalog
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::FileNotFound`] for an unknown index, or the
    /// channel error from publishing.
    pub async fn remove_file(&mut self, index: usize) -> Result<LocalFile> {
        let removed = self.catalog.remove_local(index)?;
        tracing::debug!("Removed local file #{} ({})", index, removed.descriptor());
        self.publish_local_catalog().await?;
        Ok(removed)
    }

    /// Send the complete local catalog to the connected peer
    ///
    /// Does nothing without a connected peer.
    ///
    /// # Errors
    ///
    /// Propagates channel errors.
    pub async fn publish_local_catalog(&self) -> Result<()> {
        let Some(peer) = self.session.peer() else {
            tracing::debug!("No peer connected, skipping catalog publish");
            return Ok(());
        };

        let message = CatalogMessage(self.catalog.local_descriptors());
        tracing::debug!(
            "Publishing {} file(s) to {}",
            message.0.len(),
            peer.short()
        );
        self.wiring.catalog_tx.send(&message, Some(peer), None).await
    }

    /// Local catalog, in order
    #[must_use]
    pub fn local_files(&self) -> Vec<FileDescriptor> {
        self.catalog.local_descriptors()
    }

    /// Last catalog received from the peer
    #[must_use]
    pub fn remote_files(&self) -> &[RemoteFile] {
        self.catalog.remote_files()
    }

    // ============ Transfers ============

    /// Ask the peer for the file at `index` of its catalog
    ///
    /// Returns as soon as the request is sent; progress and completion arrive
    /// through [`next_event`](Self::next_event).
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::NotConnected`] without a peer,
    /// [`RoomError::RemoteFileNotFound`] for an index outside the remote
    /// catalog, or the channel error from sending.
    pub async fn request_download(&mut self, index: usize) -> Result<()> {
        let peer = self.session.peer().ok_or(RoomError::NotConnected)?;
        let descriptor = self.catalog.remote(index)?.clone();

        self.wiring
            .request_tx
            .send(&DownloadRequest { index }, Some(peer), None)
            .await?;

        tracing::debug!("Requested #{} ({}) from {}", index, descriptor, peer.short());
        self.transfers.begin(index, descriptor, Instant::now());
        Ok(())
    }

    /// Downloaded content of remote `index`
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::BlobNotAvailable`] unless the download completed.
    pub fn retrieve(&self, index: usize) -> Result<Blob> {
        self.transfers.retrieve(index)
    }

    /// Download state of remote `index`
    #[must_use]
    pub fn transfer_state(&self, index: usize) -> TransferState {
        self.transfers.state(index)
    }

    /// Remote indices with a download in flight, ascending
    #[must_use]
    pub fn outstanding_downloads(&self) -> Vec<usize> {
        self.transfers.outstanding()
    }

    // ============ Event Loop ============

    /// Wait for and handle the next notification
    ///
    /// Returns `None` once the channel is gone.
    pub async fn next_event(&mut self) -> Option<RoomEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.closed {
                return None;
            }

            // Presence first: a peer's catalog must not overtake its join
            let wake = tokio::select! {
                biased;
                p = self.wiring.presence.recv() => Wake::Presence(p),
                m = self.wiring.catalog_rx.recv() => Wake::Catalog(m),
                m = self.wiring.request_rx.recv() => Wake::Request(m),
                m = self.wiring.content_rx.recv() => Wake::Content(m),
                _ = self.sweep.tick() => Wake::Sweep,
            };

            match wake {
                Wake::Presence(Some(presence)) => self.on_presence(presence).await,
                Wake::Catalog(Some(inbound)) => self.on_catalog(inbound),
                Wake::Request(Some(inbound)) => self.on_request(inbound).await,
                Wake::Content(Some(inbound)) => self.on_content(inbound),
                Wake::Sweep => self.on_sweep(),
                Wake::Presence(None)
                | Wake::Catalog(None)
                | Wake::Request(None)
                | Wake::Content(None) => {
                    tracing::debug!("Channel for room '{}' closed", self.session.room());
                    self.release();
                }
            }
        }
    }

    async fn on_presence(&mut self, presence: Presence) {
        match presence {
            Presence::Joined(peer) => match self.session.on_peer_join(peer.clone()) {
                PeerJoin::Accepted => {
                    self.pending.push_back(RoomEvent::PeerJoined(peer));
                    if let Err(e) = self.publish_local_catalog().await {
                        tracing::warn!("Initial catalog publish failed: {}", e);
                        self.pending.push_back(RoomEvent::Error(e));
                    }
                }
                PeerJoin::Duplicate => {}
                PeerJoin::Rejected(err) => self.pending.push_back(RoomEvent::Error(err)),
            },
            Presence::Left(peer) => {
                if !self.session.on_peer_leave(&peer) {
                    return;
                }
                self.catalog.clear_remote();
                self.pending.push_back(RoomEvent::PeerLeft(peer));
                for index in self.transfers.on_peer_left() {
                    self.pending.push_back(RoomEvent::TransferFailed {
                        index,
                        reason: FailureReason::PeerLeft,
                    });
                }
            }
        }
    }

    fn on_catalog(&mut self, inbound: Inbound<CatalogMessage>) {
        match inbound {
            Inbound::Message { from, payload, .. } => {
                if !self.accepts(&from, Tag::LocalFiles) {
                    return;
                }
                let CatalogMessage(files) = payload;
                tracing::debug!("Received catalog of {} file(s) from {}", files.len(), from.short());

                let invalidated = self.transfers.on_catalog_replaced(&files);
                self.catalog.replace_remote(files.clone());
                self.pending.push_back(RoomEvent::RemoteCatalogUpdated(files));
                for index in invalidated {
                    self.pending.push_back(RoomEvent::TransferFailed {
                        index,
                        reason: FailureReason::CatalogChanged,
                    });
                }
            }
            Inbound::Malformed { from, error } => self.on_malformed(&from, Tag::LocalFiles, error),
            Inbound::Progress { .. } => {}
        }
    }

    async fn on_request(&mut self, inbound: Inbound<DownloadRequest>) {
        match inbound {
            Inbound::Message { from, payload, .. } => {
                if !self.accepts(&from, Tag::RequestDownload) {
                    return;
                }
                if let Err(e) = self.serve(payload.index, &from).await {
                    tracing::warn!("Cannot serve #{} to {}: {}", payload.index, from.short(), e);
                    self.pending.push_back(RoomEvent::Error(e));
                }
            }
            Inbound::Malformed { from, error } => {
                self.on_malformed(&from, Tag::RequestDownload, error);
            }
            Inbound::Progress { .. } => {}
        }
    }

    async fn serve(&mut self, index: usize, to: &PeerId) -> Result<()> {
        let content = transfer::read_requested(&self.catalog, index).await?;
        let name = self.catalog.local(index)?.descriptor().name.clone();
        let size = content.0.len() as u64;

        self.wiring
            .content_tx
            .send(&content, Some(to), Some(Metadata { index }))
            .await?;

        tracing::info!("Sent #{} ({}, {} bytes) to {}", index, name, size, to.short());
        self.pending
            .push_back(RoomEvent::FileServed { index, name, size });
        Ok(())
    }

    fn on_content(&mut self, inbound: Inbound<FileContent>) {
        match inbound {
            Inbound::Progress {
                from,
                fraction,
                metadata,
            } => {
                if !self.accepts(&from, Tag::Download) {
                    return;
                }
                let Some(Metadata { index }) = metadata else {
                    tracing::warn!("Progress without index from {}", from.short());
                    return;
                };
                if let Some(percent) = self.transfers.on_progress(index, fraction, Instant::now())
                {
                    tracing::trace!("Download #{}: {}%", index, percent);
                    self.pending
                        .push_back(RoomEvent::DownloadProgress { index, percent });
                }
            }
            Inbound::Message {
                from,
                payload,
                metadata,
            } => {
                if !self.accepts(&from, Tag::Download) {
                    return;
                }
                let Some(Metadata { index }) = metadata else {
                    tracing::warn!(
                        "Discarding {} bytes without index from {}",
                        payload.0.len(),
                        from.short()
                    );
                    return;
                };
                match self.transfers.on_content(index, payload.0, Instant::now()) {
                    ContentOutcome::Stored { len } => {
                        let name = self.transfers.descriptor(index).map(|d| d.name.clone());
                        tracing::info!(
                            "Downloaded #{} ({}, {} bytes)",
                            index,
                            name.as_deref().unwrap_or("unrequested"),
                            len
                        );
                        self.pending.push_back(RoomEvent::DownloadComplete {
                            index,
                            name,
                            size: len,
                        });
                    }
                    ContentOutcome::Mismatched { .. } => {
                        self.pending.push_back(RoomEvent::TransferFailed {
                            index,
                            reason: FailureReason::CatalogChanged,
                        });
                    }
                    ContentOutcome::Dropped => {}
                }
            }
            Inbound::Malformed { from, error } => self.on_malformed(&from, Tag::Download, error),
        }
    }

    fn on_sweep(&mut self) {
        for index in self.transfers.expire_stalled(Instant::now()) {
            tracing::warn!("Download #{} stalled", index);
            self.pending.push_back(RoomEvent::TransferFailed {
                index,
                reason: FailureReason::TimedOut,
            });
        }
    }

    fn on_malformed(&mut self, from: &PeerId, tag: Tag, error: RoomError) {
        if !self.accepts(from, tag) {
            return;
        }
        tracing::warn!("Malformed '{}' payload from {}: {}", tag, from.short(), error);
        self.pending.push_back(RoomEvent::Error(error));
    }

    fn accepts(&self, from: &PeerId, tag: Tag) -> bool {
        if self.session.is_from_peer(from) {
            return true;
        }
        tracing::warn!("Ignoring '{}' from non-peer {}", tag, from.short());
        false
    }
}

impl<C: PeerChannel + 'static> Drop for Room<C> {
    fn drop(&mut self) {
        self.release();
    }
}
