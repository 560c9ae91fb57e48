//! Two-peer test fixture for integration testing
//!
//! Joins two rooms named alike on a shared [`MemoryHub`] and drives their
//! event loops from the test body, so every step of an exchange can be
//! observed in order.
//!
//! # Example
//!
//! ```no_run
//! use roomdrop_integration_tests::fixtures::TwoPeerFixture;
//! use roomdrop_core::LocalFile;
//!
//! # async fn demo() -> roomdrop_core::Result<()> {
//! let mut fixture = TwoPeerFixture::new("lobby").await?;
//! fixture.alice.add_file(LocalFile::from_bytes("a.txt", b"hi".to_vec())).await?;
//! fixture.connect().await?;
//!
//! let blob = fixture.download(0).await?;
//! assert_eq!(blob.as_bytes(), b"hi");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use roomdrop_core::{
    Blob, MemoryChannel, MemoryChannelConfig, MemoryHub, Result, Room, RoomConfig, RoomError,
    RoomEvent, RoomId,
};

/// Upper bound on waiting for a single event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the next event of `room`
///
/// # Errors
///
/// Returns a channel error on timeout or [`RoomError::Closed`] once the
/// room's channel is gone.
pub async fn next_event(room: &mut Room<MemoryChannel>) -> Result<RoomEvent> {
    match tokio::time::timeout(EVENT_TIMEOUT, room.next_event()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(RoomError::Closed),
        Err(_) => Err(RoomError::channel("timed out waiting for a room event")),
    }
}

/// Drive `room` until an event matches `pred`
///
/// Returns the events skipped on the way and the matching event.
///
/// # Errors
///
/// Same as [`next_event`].
pub async fn wait_for<F>(
    room: &mut Room<MemoryChannel>,
    mut pred: F,
) -> Result<(Vec<RoomEvent>, RoomEvent)>
where
    F: FnMut(&RoomEvent) -> bool,
{
    let mut skipped = Vec::new();
    loop {
        let event = next_event(room).await?;
        if pred(&event) {
            return Ok((skipped, event));
        }
        skipped.push(event);
    }
}

/// Two participants sharing one room
pub struct TwoPeerFixture {
    /// Hub both participants are connected through
    pub hub: MemoryHub,
    /// Shared room name
    pub room: RoomId,
    /// First participant, usually the one sharing
    pub alice: Room<MemoryChannel>,
    /// Second participant, usually the one downloading
    pub bob: Room<MemoryChannel>,
}

impl TwoPeerFixture {
    /// Join two participants with default configuration
    ///
    /// # Errors
    ///
    /// Propagates join errors.
    pub async fn new(room: &str) -> Result<Self> {
        Self::new_with_config(room, RoomConfig::default(), MemoryChannelConfig::default()).await
    }

    /// Join two participants with custom configuration
    ///
    /// # Errors
    ///
    /// Propagates configuration and join errors.
    pub async fn new_with_config(
        room: &str,
        room_config: RoomConfig,
        channel_config: MemoryChannelConfig,
    ) -> Result<Self> {
        let hub = MemoryHub::with_config(channel_config)?;
        let room = RoomId::new(room)?;

        let alice = Room::join(&hub, room.clone(), room_config.clone())
            .await?
            .into_room()?;
        let bob = Room::join(&hub, room.clone(), room_config)
            .await?
            .into_room()?;

        Ok(Self {
            hub,
            room,
            alice,
            bob,
        })
    }

    /// Process both joins and both initial catalogs
    ///
    /// # Errors
    ///
    /// Fails if either side does not see the other join.
    pub async fn connect(&mut self) -> Result<()> {
        wait_for(&mut self.alice, |e| matches!(e, RoomEvent::PeerJoined(_))).await?;
        wait_for(&mut self.bob, |e| matches!(e, RoomEvent::PeerJoined(_))).await?;
        wait_for(&mut self.alice, |e| {
            matches!(e, RoomEvent::RemoteCatalogUpdated(_))
        })
        .await?;
        wait_for(&mut self.bob, |e| {
            matches!(e, RoomEvent::RemoteCatalogUpdated(_))
        })
        .await?;
        Ok(())
    }

    /// Bob downloads `index` from Alice
    ///
    /// # Errors
    ///
    /// Returns Alice's serving error, or [`RoomError::InvalidState`] if the
    /// transfer fails on Bob's side.
    pub async fn download(&mut self, index: usize) -> Result<Blob> {
        self.bob.request_download(index).await?;

        let (_, served) = wait_for(&mut self.alice, |e| {
            matches!(e, RoomEvent::FileServed { .. } | RoomEvent::Error(_))
        })
        .await?;
        if let RoomEvent::Error(err) = served {
            return Err(err);
        }

        let (_, done) = wait_for(&mut self.bob, |e| {
            matches!(
                e,
                RoomEvent::DownloadComplete { index: i, .. }
                    | RoomEvent::TransferFailed { index: i, .. } if *i == index
            )
        })
        .await?;
        match done {
            RoomEvent::DownloadComplete { .. } => self.bob.retrieve(index),
            _ => Err(RoomError::invalid_state("download failed")),
        }
    }

    /// Join a third participant to the same room
    ///
    /// # Errors
    ///
    /// Propagates join errors; a full room is an `Ok` outcome.
    pub async fn join_third(&self) -> Result<roomdrop_core::JoinOutcome<MemoryChannel>> {
        Room::join(&self.hub, self.room.clone(), RoomConfig::default()).await
    }
}
