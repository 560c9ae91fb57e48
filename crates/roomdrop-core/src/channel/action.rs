//! Typed send/receive pairs over channel tags
//!
//! Each protocol message is a [`Payload`] bound to exactly one [`Tag`].
//! [`Action::make`] takes the tag's consumer slot and returns a sender and a
//! receiver that encode and decode that payload type, so handlers never see
//! raw bytes.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

use super::{Delivery, Metadata, PeerChannel, Tag, TagReceiver};
use crate::error::{Result, RoomError};
use crate::types::{FileDescriptor, PeerId};

/// Message type carried on one tag
pub trait Payload: Sized + Send {
    /// Tag the payload travels on
    const TAG: Tag;

    /// Encode for the wire
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`] if encoding fails.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Decode from the wire
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Serialization`] for malformed input.
    fn decode(bytes: Vec<u8>) -> Result<Self>;
}

/// The sender's complete local catalog, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogMessage(pub Vec<FileDescriptor>);

impl Payload for CatalogMessage {
    const TAG: Tag = Tag::LocalFiles;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Request for the file at `index` of the receiver's local catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadRequest {
    /// Catalog index
    pub index: usize,
}

impl Payload for DownloadRequest {
    const TAG: Tag = Tag::RequestDownload;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Raw file bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent(pub Vec<u8>);

impl Payload for FileContent {
    const TAG: Tag = Tag::Download;

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }

    fn decode(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self(bytes))
    }
}

/// Decoded delivery of a payload type
#[derive(Debug)]
pub enum Inbound<P> {
    /// Complete, decoded payload
    Message {
        /// Sending peer
        from: PeerId,
        /// Decoded payload
        payload: P,
        /// Metadata sent alongside
        metadata: Option<Metadata>,
    },
    /// Transmission progress
    Progress {
        /// Sending peer
        from: PeerId,
        /// Fraction received
        fraction: f64,
        /// Metadata of the payload in flight
        metadata: Option<Metadata>,
    },
    /// Payload that failed to decode
    Malformed {
        /// Sending peer
        from: PeerId,
        /// Decoding error
        error: RoomError,
    },
}

/// Sending half of an action
pub struct ActionSender<P, C: ?Sized> {
    channel: Arc<C>,
    _payload: PhantomData<fn(P)>,
}

impl<P: Payload, C: PeerChannel + ?Sized> ActionSender<P, C> {
    /// Encode and send `payload`
    ///
    /// # Errors
    ///
    /// Propagates encoding and channel errors.
    pub async fn send(
        &self,
        payload: &P,
        target: Option<&PeerId>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        let bytes = payload.encode()?;
        self.channel.send(P::TAG, bytes, target, metadata).await
    }
}

/// Receiving half of an action
pub struct ActionReceiver<P> {
    inner: TagReceiver,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> ActionReceiver<P> {
    /// Wait for the next decoded delivery; `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<Inbound<P>> {
        let delivery = self.inner.recv().await?;
        Some(match delivery {
            Delivery::Message {
                from,
                payload,
                metadata,
            } => match P::decode(payload) {
                Ok(payload) => Inbound::Message {
                    from,
                    payload,
                    metadata,
                },
                Err(error) => Inbound::Malformed { from, error },
            },
            Delivery::Progress {
                from,
                fraction,
                metadata,
            } => Inbound::Progress {
                from,
                fraction,
                metadata,
            },
        })
    }
}

/// Constructor for typed tag pairs
pub struct Action;

impl Action {
    /// Subscribe to `P::TAG` and return the typed sender and receiver
    ///
    /// # Errors
    ///
    /// Fails if the tag already has a consumer.
    pub fn make<P: Payload, C: PeerChannel + ?Sized>(
        channel: &Arc<C>,
    ) -> Result<(ActionSender<P, C>, ActionReceiver<P>)> {
        let inner = channel.subscribe(P::TAG)?;
        Ok((
            ActionSender {
                channel: Arc::clone(channel),
                _payload: PhantomData,
            },
            ActionReceiver {
                inner,
                _payload: PhantomData,
            },
        ))
    }
}
