//! Local and remote file catalogs
//!
//! The local catalog is an ordered list of files this participant offers; the
//! remote catalog is the last list the peer advertised. Both are addressed by
//! position. The remote side is only ever replaced wholesale.

use crate::error::{Result, RoomError};
use crate::source::LocalFile;
use crate::types::FileDescriptor;

/// Entry of the peer's catalog
pub type RemoteFile = FileDescriptor;

/// Files offered locally and files advertised by the peer
#[derive(Debug)]
pub struct Catalog {
    local: Vec<LocalFile>,
    remote: Vec<RemoteFile>,
    max_file_size: u64,
}

impl Catalog {
    /// Create an empty catalog accepting files up to `max_file_size` bytes
    #[must_use]
    pub fn new(max_file_size: u64) -> Self {
        Self {
            local: Vec::new(),
            remote: Vec::new(),
            max_file_size,
        }
    }

    /// Append a local file and return its index
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::FileTooLarge`] if the file exceeds the size limit.
    pub fn add_local(&mut self, file: LocalFile) -> Result<usize> {
        let descriptor = file.descriptor();
        if descriptor.size > self.max_file_size {
            return Err(RoomError::FileTooLarge {
                name: descriptor.name.clone(),
                size: descriptor.size,
                limit: self.max_file_size,
            });
        }

        self.local.push(file);
        Ok(self.local.len() - 1)
    }

    /// Remove the local file at `index`; later files shift down by one
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::FileNotFound`] if `index` is out of range.
    pub fn remove_local(&mut self, index: usize) -> Result<LocalFile> {
        if index >= self.local.len() {
            return Err(RoomError::FileNotFound {
                index,
                available: self.local.len(),
            });
        }
        Ok(self.local.remove(index))
    }

    /// Local file at `index`
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::FileNotFound`] if `index` is out of range.
    pub fn local(&self, index: usize) -> Result<&LocalFile> {
        self.local.get(index).ok_or(RoomError::FileNotFound {
            index,
            available: self.local.len(),
        })
    }

    /// Descriptors of every local file, in order
    #[must_use]
    pub fn local_descriptors(&self) -> Vec<FileDescriptor> {
        self.local.iter().map(|f| f.descriptor().clone()).collect()
    }

    /// Replace the remote catalog with `files`, returning the previous one
    pub fn replace_remote(&mut self, files: Vec<RemoteFile>) -> Vec<RemoteFile> {
        std::mem::replace(&mut self.remote, files)
    }

    /// Forget the remote catalog
    pub fn clear_remote(&mut self) {
        self.remote.clear();
    }

    /// Remote file at `index`
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::RemoteFileNotFound`] if `index` is out of range.
    pub fn remote(&self, index: usize) -> Result<&RemoteFile> {
        self.remote.get(index).ok_or(RoomError::RemoteFileNotFound {
            index,
            available: self.remote.len(),
        })
    }

    /// The whole remote catalog
    #[must_use]
    pub fn remote_files(&self) -> &[RemoteFile] {
        &self.remote
    }

    /// Size limit for local files
    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}
