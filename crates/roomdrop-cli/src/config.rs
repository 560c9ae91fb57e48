//! Configuration system for the Roomdrop CLI.

use roomdrop_core::{MemoryChannelConfig, RoomConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Roomdrop configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Room configuration
    #[serde(default)]
    pub room: RoomSection,
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferSection,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Room configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSection {
    /// Largest shareable file in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSection {
    /// Progress slice size of the in-process channel
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Seconds without progress before a download fails (0 disables)
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    /// Milliseconds between stall checks
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_max_file_size() -> u64 {
    roomdrop_core::config::DEFAULT_MAX_FILE_SIZE
}

fn default_chunk_size() -> usize {
    roomdrop_core::channel::memory::DEFAULT_CHUNK_SIZE
}

fn default_stall_timeout_secs() -> u64 {
    roomdrop_core::config::DEFAULT_STALL_TIMEOUT.as_secs()
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RoomSection {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            stall_timeout_secs: default_stall_timeout_secs(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("roomdrop/config.toml")
    }

    /// Load config from the default path, falling back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.room.max_file_size == 0 {
            anyhow::bail!("Max file size must be non-zero");
        }

        if self.transfer.chunk_size == 0 || self.transfer.chunk_size > 16 * 1024 * 1024 {
            anyhow::bail!("Chunk size must be between 1 and 16MB");
        }

        if self.transfer.sweep_interval_ms == 0 {
            anyhow::bail!("Sweep interval must be non-zero");
        }

        self.room_config().validate()?;
        Ok(())
    }

    /// Room settings for the core
    #[must_use]
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            max_file_size: self.room.max_file_size,
            stall_timeout: (self.transfer.stall_timeout_secs > 0)
                .then(|| Duration::from_secs(self.transfer.stall_timeout_secs)),
            sweep_interval: Duration::from_millis(self.transfer.sweep_interval_ms),
        }
    }

    /// Settings for the in-process channel
    #[must_use]
    pub fn channel_config(&self) -> MemoryChannelConfig {
        MemoryChannelConfig {
            chunk_size: self.transfer.chunk_size,
        }
    }
}
