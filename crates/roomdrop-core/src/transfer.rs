//! Transfer state machine for on-demand downloads
//!
//! Downloads are keyed by the requester's view of the remote catalog index.
//! Each index runs its own state machine:
//!
//! ```text
//! NotRequested --request--> Requested --progress--> InProgress(%) --content--> Complete
//!                               |                        |
//!                               +------------------------+--> Failed(PeerLeft | CatalogChanged | TimedOut)
//! ```
//!
//! Percentages never decrease within an attempt. `Complete` and `Failed` end
//! an attempt; a fresh request starts a new one.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::catalog::Catalog;
use crate::channel::FileContent;
use crate::error::{Result, RoomError};
use crate::types::{Blob, FileDescriptor};

/// Why a transfer attempt ended without content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The peer left before the content arrived
    PeerLeft,
    /// The peer's catalog changed and the index now names another file
    CatalogChanged,
    /// No progress for longer than the stall timeout
    TimedOut,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerLeft => write!(f, "peer left"),
            Self::CatalogChanged => write!(f, "remote catalog changed"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// State of one index
#[derive(Debug, Clone, PartialEq)]
pub enum TransferState {
    /// Never requested
    NotRequested,
    /// Request sent, nothing received yet
    Requested,
    /// Content in flight, percent received
    InProgress(u8),
    /// Content received
    Complete(Blob),
    /// Attempt ended without content
    Failed(FailureReason),
}

impl TransferState {
    /// Payload-free status
    #[must_use]
    pub fn status(&self) -> TransferStatus {
        match self {
            Self::NotRequested => TransferStatus::NotRequested,
            Self::Requested => TransferStatus::Requested,
            Self::InProgress(_) => TransferStatus::InProgress,
            Self::Complete(_) => TransferStatus::Complete,
            Self::Failed(_) => TransferStatus::Failed,
        }
    }

    /// True while waiting for content
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Requested | Self::InProgress(_))
    }

    /// True once the attempt has ended
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Failed(_))
    }

    /// Percent received (0 before any progress, 100 once complete)
    #[must_use]
    pub fn percent(&self) -> u8 {
        match self {
            Self::InProgress(p) => *p,
            Self::Complete(_) => 100,
            _ => 0,
        }
    }
}

/// Transfer status without content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Never requested
    NotRequested,
    /// Request sent
    Requested,
    /// Content in flight
    InProgress,
    /// Content received
    Complete,
    /// Attempt ended without content
    Failed,
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequested => write!(f, "NotRequested"),
            Self::Requested => write!(f, "Requested"),
            Self::InProgress => write!(f, "InProgress"),
            Self::Complete => write!(f, "Complete"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// What happened to content delivered for an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentOutcome {
    /// Stored as complete
    Stored {
        /// Content length in bytes
        len: usize,
    },
    /// Discarded because the index no longer identifies the requested file
    Dropped,
    /// Length differs from the requested file; the attempt is now failed
    Mismatched {
        /// Bytes the requested file should have
        expected: u64,
        /// Bytes delivered
        len: usize,
    },
}

#[derive(Debug, Clone)]
struct TransferRecord {
    /// Remote file the index pointed at when requested
    descriptor: Option<FileDescriptor>,
    state: TransferState,
    last_activity: Instant,
}

/// Download state for every remote index of the current session
#[derive(Debug, Default)]
pub struct Transfers {
    records: HashMap<usize, TransferRecord>,
    stall_timeout: Option<Duration>,
}

impl Transfers {
    /// Create an empty table; `stall_timeout` of `None` disables expiry
    #[must_use]
    pub fn new(stall_timeout: Option<Duration>) -> Self {
        Self {
            records: HashMap::new(),
            stall_timeout,
        }
    }

    /// Start a new attempt for `index`, remembering which file it names
    pub fn begin(&mut self, index: usize, descriptor: FileDescriptor, now: Instant) {
        if let Some(previous) = self.records.get(&index) {
            if previous.state.is_outstanding() {
                tracing::debug!(
                    "Restarting outstanding transfer for index {} ({})",
                    index,
                    descriptor.name
                );
            }
        }

        self.records.insert(
            index,
            TransferRecord {
                descriptor: Some(descriptor),
                state: TransferState::Requested,
                last_activity: now,
            },
        );
    }

    /// Apply a progress fraction; returns the new percent if the state changed
    pub fn on_progress(&mut self, index: usize, fraction: f64, now: Instant) -> Option<u8> {
        if !fraction.is_finite() {
            return None;
        }
        let percent = (fraction.clamp(0.0, 1.0) * 100.0).round() as u8;

        let record = self.records.entry(index).or_insert_with(|| TransferRecord {
            descriptor: None,
            state: TransferState::Requested,
            last_activity: now,
        });

        let next = match record.state {
            TransferState::Requested => percent,
            TransferState::InProgress(current) if percent > current => percent,
            TransferState::InProgress(_) => {
                record.last_activity = now;
                return None;
            }
            // Late progress after the attempt ended
            _ => return None,
        };

        record.state = TransferState::InProgress(next);
        record.last_activity = now;
        Some(next)
    }

    /// Store delivered content for `index`
    pub fn on_content(&mut self, index: usize, data: Vec<u8>, now: Instant) -> ContentOutcome {
        let record = self.records.entry(index).or_insert_with(|| TransferRecord {
            descriptor: None,
            state: TransferState::Requested,
            last_activity: now,
        });

        if record.state == TransferState::Failed(FailureReason::CatalogChanged) {
            tracing::warn!(
                "Dropping {} bytes for index {}: the catalog changed since the request",
                data.len(),
                index
            );
            return ContentOutcome::Dropped;
        }

        let len = data.len();
        if let Some(expected) = record.descriptor.as_ref().map(|d| d.size) {
            if expected != len as u64 {
                tracing::warn!(
                    "Dropping {} bytes for index {}: requested file has {} bytes",
                    len,
                    index,
                    expected
                );
                record.state = TransferState::Failed(FailureReason::CatalogChanged);
                record.last_activity = now;
                return ContentOutcome::Mismatched { expected, len };
            }
        }

        record.state = TransferState::Complete(Blob::new(data));
        record.last_activity = now;
        ContentOutcome::Stored { len }
    }

    /// Reconcile every record with the peer's new catalog
    ///
    /// Outstanding attempts whose index now names a different file fail with
    /// [`FailureReason::CatalogChanged`]; their indices are returned in
    /// ascending order. Completed content for such an index is forgotten, and
    /// ended attempts are marked so late content for them is dropped.
    pub fn on_catalog_replaced(&mut self, remote: &[FileDescriptor]) -> Vec<usize> {
        let shifted = |index: usize, record: &TransferRecord| {
            record.descriptor.is_none() || remote.get(index) != record.descriptor.as_ref()
        };
        let failed = self.fail_where(FailureReason::CatalogChanged, shifted);

        let before = self.records.len();
        self.records.retain(|index, record| {
            !(matches!(record.state, TransferState::Complete(_)) && shifted(*index, &*record))
        });
        if self.records.len() < before {
            tracing::debug!(
                "Forgot {} completed download(s) whose index moved",
                before - self.records.len()
            );
        }

        for (index, record) in &mut self.records {
            if matches!(record.state, TransferState::Failed(_)) && shifted(*index, &*record) {
                record.state = TransferState::Failed(FailureReason::CatalogChanged);
            }
        }
        failed
    }

    /// Fail every outstanding attempt after the peer left, then forget all
    /// records of that peer
    ///
    /// Returns the indices that were still outstanding.
    pub fn on_peer_left(&mut self) -> Vec<usize> {
        let failed = self.fail_where(FailureReason::PeerLeft, |_, _| true);
        self.records.clear();
        failed
    }

    /// Fail outstanding attempts idle for at least the stall timeout
    pub fn expire_stalled(&mut self, now: Instant) -> Vec<usize> {
        let Some(timeout) = self.stall_timeout else {
            return Vec::new();
        };
        self.fail_where(FailureReason::TimedOut, |_, record| {
            now.saturating_duration_since(record.last_activity) >= timeout
        })
    }

    fn fail_where(
        &mut self,
        reason: FailureReason,
        predicate: impl Fn(usize, &TransferRecord) -> bool,
    ) -> Vec<usize> {
        let mut failed: Vec<usize> = self
            .records
            .iter_mut()
            .filter(|(index, record)| record.state.is_outstanding() && predicate(**index, record))
            .map(|(index, record)| {
                record.state = TransferState::Failed(reason);
                *index
            })
            .collect();
        failed.sort_unstable();

        if !failed.is_empty() {
            tracing::debug!("Transfers {:?} failed: {}", failed, reason);
        }
        failed
    }

    /// Current state of `index`
    #[must_use]
    pub fn state(&self, index: usize) -> TransferState {
        self.records
            .get(&index)
            .map_or(TransferState::NotRequested, |r| r.state.clone())
    }

    /// File `index` named when it was requested
    #[must_use]
    pub fn descriptor(&self, index: usize) -> Option<&FileDescriptor> {
        self.records.get(&index).and_then(|r| r.descriptor.as_ref())
    }

    /// Completed content of `index`
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::BlobNotAvailable`] unless the transfer is complete.
    pub fn retrieve(&self, index: usize) -> Result<Blob> {
        match self.records.get(&index).map(|r| &r.state) {
            Some(TransferState::Complete(blob)) => Ok(blob.clone()),
            other => Err(RoomError::BlobNotAvailable {
                index,
                status: other.map_or(TransferStatus::NotRequested, TransferState::status),
            }),
        }
    }

    /// Indices with an attempt in flight
    #[must_use]
    pub fn outstanding(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .records
            .iter()
            .filter(|(_, r)| r.state.is_outstanding())
            .map(|(i, _)| *i)
            .collect();
        indices.sort_unstable();
        indices
    }
}

/// Read the local file a peer asked for
///
/// # Errors
///
/// Returns [`RoomError::FileNotFound`] if `index` is not in the local catalog,
/// or the source's read error.
pub async fn read_requested(catalog: &Catalog, index: usize) -> Result<FileContent> {
    let file = catalog.local(index)?;
    let data = file.read().await?;
    Ok(FileContent(data))
}
