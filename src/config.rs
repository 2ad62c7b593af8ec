//! Extraction settings
//!
//! [`ExtractConfig`] carries the knobs the decoder applies around the engine:
//! the mixing level handed to every stream load, the playback channel, the
//! output volume and how repeated bank loads are treated. It can be built in
//! code or read from a JSON file; missing keys fall back to the defaults.

use crate::engine::DEFAULT_MIXING_LEVEL;
use crate::rom::DuplicateBankPolicy;
use crate::{DcsError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings applied by [`crate::Decoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Gain passed to the engine with each stream (default: 0x64)
    pub mixing_level: u8,
    /// Playback channel the cursor is bound to (default: 0)
    pub channel: u8,
    /// Master and default volume, 0-255 (default: 255)
    pub volume: u8,
    /// What happens when a chip-select is loaded twice (default: replace)
    pub duplicate_banks: DuplicateBankPolicy,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            mixing_level: DEFAULT_MIXING_LEVEL,
            channel: 0,
            volume: 255,
            duplicate_banks: DuplicateBankPolicy::Replace,
        }
    }
}

impl ExtractConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DcsError::ConfigError(e.to_string()))
    }

    /// Read a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)
            .map_err(|e| DcsError::ConfigError(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Check the settings against an engine's channel range
    pub fn validate(&self, channel_count: u8) -> Result<()> {
        if self.channel >= channel_count {
            return Err(DcsError::ConfigError(format!(
                "channel {} is outside 0..{}",
                self.channel, channel_count
            )));
        }
        Ok(())
    }

    /// Override the mixing level
    pub fn mixing_level(mut self, level: u8) -> Self {
        self.mixing_level = level;
        self
    }

    /// Override the playback channel
    pub fn channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }

    /// Override the output volume
    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    /// Refuse to load a chip-select twice
    pub fn reject_duplicate_banks(mut self, reject: bool) -> Self {
        self.duplicate_banks = if reject {
            DuplicateBankPolicy::Reject
        } else {
            DuplicateBankPolicy::Replace
        };
        self
    }
}
