//! Identifiers, file descriptors and downloaded content

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, RoomError};

/// Opaque identifier of a room participant, assigned by the channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap a channel-assigned identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier (16 hex characters)
    ///
    /// # Errors
    ///
    /// Returns an error if the OS entropy source is unavailable.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; 8];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| RoomError::Channel(format!("peer id generation: {e}").into()))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Borrow the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a rendezvous room
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(String);

impl RoomId {
    /// Validate and wrap a room name
    ///
    /// Surrounding whitespace is trimmed; an empty name is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] for an empty name.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(RoomError::invalid_config("room name must not be empty"));
        }
        Ok(Self(name.to_string()))
    }

    /// Make up a room name for someone who did not pick one
    ///
    /// # Errors
    ///
    /// Returns an error if the OS entropy source is unavailable.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; 4];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| RoomError::Channel(format!("room name generation: {e}").into()))?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Borrow the room name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name and size of a file, without its content
///
/// Serializes to exactly `{"name": ..., "size": ...}`, which is the element
/// shape of a catalog message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name, including extension
    pub name: String,
    /// Size in bytes
    pub size: u64,
}

impl FileDescriptor {
    /// Create a descriptor
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    /// Name up to the first `.`
    #[must_use]
    pub fn stem(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Upper-cased text between the first and second `.`, or `-` when absent
    #[must_use]
    pub fn extension(&self) -> String {
        self.name
            .split('.')
            .nth(1)
            .map_or_else(|| "-".to_string(), str::to_uppercase)
    }

    /// Size in KiB, rounded up
    #[must_use]
    pub fn size_kib(&self) -> u64 {
        self.size.div_ceil(1024)
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} KB)", self.name, self.size_kib())
    }
}

/// Completed download content
///
/// Cheap to clone; the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob {
    data: Arc<[u8]>,
}

impl Blob {
    /// Media type given to every downloaded blob
    pub const MEDIA_TYPE: &'static str = "application/octet-stream";

    /// Wrap received bytes
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data: data.into() }
    }

    /// Borrow the content
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Content length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for zero-length content
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Media type of the content
    #[must_use]
    pub fn media_type(&self) -> &'static str {
        Self::MEDIA_TYPE
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("len", &self.data.len()).finish()
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
