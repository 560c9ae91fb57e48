//! Room configuration

use std::time::Duration;

use crate::error::{Result, RoomError};

/// Default size limit for shared files (5 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Default idle time before an outstanding transfer is failed
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between stall sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Per-room settings
#[derive(Debug, Clone, PartialEq)]
pub struct RoomConfig {
    /// Largest file accepted into the local catalog, in bytes
    pub max_file_size: u64,

    /// Idle time after which an outstanding transfer fails with `TimedOut`;
    /// `None` disables expiry
    pub stall_timeout: Option<Duration>,

    /// How often outstanding transfers are checked for stalls
    pub sweep_interval: Duration,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            stall_timeout: Some(DEFAULT_STALL_TIMEOUT),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl RoomConfig {
    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::InvalidConfig`] for a zero size limit, a zero
    /// stall timeout or a zero sweep interval.
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(RoomError::invalid_config("max_file_size must be non-zero"));
        }
        if self.stall_timeout.is_some_and(|t| t.is_zero()) {
            return Err(RoomError::invalid_config(
                "stall_timeout must be non-zero (use None to disable)",
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(RoomError::invalid_config("sweep_interval must be non-zero"));
        }
        Ok(())
    }
}
