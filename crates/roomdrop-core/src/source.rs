//! Local file content handles
//!
//! A [`LocalFile`] pairs a [`FileDescriptor`] with a handle that can produce the
//! file's bytes on demand. Reading is a single suspending operation; chunking
//! during transmission is the channel's business.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, RoomError};
use crate::types::FileDescriptor;

/// Source of a local file's content
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Read the full content
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Io`] if the content can no longer be read.
    async fn read_all(&self) -> Result<Vec<u8>>;
}

/// Content held in memory
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    /// Wrap bytes
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl FileSource for MemorySource {
    async fn read_all(&self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

/// Content read from disk each time it is requested
pub struct PathSource {
    path: PathBuf,
}

impl PathSource {
    /// Reference a file on disk
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FileSource for PathSource {
    async fn read_all(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| RoomError::Io(format!("{}: {e}", self.path.display())))
    }
}

/// A file offered to the peer, owned by the local participant
pub struct LocalFile {
    descriptor: FileDescriptor,
    source: Box<dyn FileSource>,
}

impl LocalFile {
    /// Create a file from a descriptor and a content handle
    pub fn new(descriptor: FileDescriptor, source: Box<dyn FileSource>) -> Self {
        Self { descriptor, source }
    }

    /// Create an in-memory file
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let descriptor = FileDescriptor::new(name, data.len() as u64);
        Self::new(descriptor, Box::new(MemorySource::new(data)))
    }

    /// Create a file backed by a path, taking name and size from the filesystem
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Io`] if the file metadata cannot be read.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| RoomError::Io(format!("{}: {e}", path.display())))?;
        if !metadata.is_file() {
            return Err(RoomError::Io(format!("{}: not a regular file", path.display())));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self::new(
            FileDescriptor::new(name, metadata.len()),
            Box::new(PathSource::new(path)),
        ))
    }

    /// Name and size
    #[must_use]
    pub fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    /// Read the full content
    ///
    /// # Errors
    ///
    /// Propagates the source's read error.
    pub async fn read(&self) -> Result<Vec<u8>> {
        self.source.read_all().await
    }
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
