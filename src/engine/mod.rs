//! Decode Engine abstraction
//!
//! This module defines the interface to the bitstream decoder. The engine
//! understands the stream format and exposes a single sample-at-a-time
//! playback cursor; everything else (bank ownership, pointer validation,
//! container packaging) lives outside of it.

#[cfg(feature = "raw-engine")]
pub mod raw;

use crate::rom::{RomPointer, RomStore};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Decoded samples per frame
pub const SAMPLES_PER_FRAME: u32 = 240;

/// Bytes per decoded sample (16-bit)
pub const BYTES_PER_SAMPLE: u32 = 2;

/// Output sample rate in Hz
pub const SAMPLE_RATE: u32 = 31_250;

/// Decoded bytes per frame
pub const FRAME_BYTES: u32 = SAMPLES_PER_FRAME * BYTES_PER_SAMPLE;

/// Default mixing level passed to the engine (0x64)
pub const DEFAULT_MIXING_LEVEL: u8 = 0x64;

/// Stream metadata reported by the engine
///
/// Only constructible from a frame count, so `byte_count` is always
/// `frame_count * 240 * 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    frame_count: u16,
    byte_count: u32,
    format_type: u8,
    format_sub_type: u8,
}

impl StreamInfo {
    /// Build stream metadata from a header's frame count and format tags
    pub fn new(frame_count: u16, format_type: u8, format_sub_type: u8) -> Self {
        StreamInfo {
            frame_count,
            byte_count: frame_count as u32 * FRAME_BYTES,
            format_type,
            format_sub_type,
        }
    }

    /// Number of 240-sample frames
    pub fn frame_count(&self) -> u16 {
        self.frame_count
    }

    /// Decoded payload size in bytes
    pub fn byte_count(&self) -> u32 {
        self.byte_count
    }

    /// Engine-defined format type tag
    pub fn format_type(&self) -> u8 {
        self.format_type
    }

    /// Engine-defined format subtype tag
    pub fn format_sub_type(&self) -> u8 {
        self.format_sub_type
    }

    /// Number of decoded samples
    pub fn sample_count(&self) -> u32 {
        self.byte_count / BYTES_PER_SAMPLE
    }

    /// Playback duration in seconds (7.68 ms per frame)
    pub fn duration_secs(&self) -> f64 {
        self.sample_count() as f64 / SAMPLE_RATE as f64
    }
}

/// Common interface for stream decode engines
///
/// Every method that touches ROM content receives the store for the duration
/// of the call. Engines must not retain slices or addresses derived from it
/// between calls; the cursor is tracked as a [`RomPointer`] and re-read from
/// the store on every pull.
///
/// An engine has exactly one playback cursor. `load_audio_stream` replaces
/// whatever the cursor was doing, so at most one stream may be pulled at a
/// time.
pub trait DecodeEngine {
    /// Validate the loaded bank set
    ///
    /// Returns 0 when every bank the engine expects is present and correctly
    /// identified; any other value is an engine-defined status code.
    fn check_roms(&mut self, roms: &RomStore) -> u8;

    /// Reset engine state, dropping the cursor and restoring default volume
    fn soft_boot(&mut self);

    /// Identification string embedded in the ROM set
    fn signature(&self, roms: &RomStore) -> Result<String>;

    /// Set the live output volume (0-255)
    fn set_master_volume(&mut self, level: u8);

    /// Set the volume restored by `soft_boot` (0-255)
    fn set_default_volume(&mut self, level: u8);

    /// Highest valid track number in the track table
    fn max_track_number(&self, roms: &RomStore) -> Result<u16>;

    /// Pointer to the stream a track plays, or `None` if the track has none
    ///
    /// Callers check `track` against [`DecodeEngine::max_track_number`] first.
    fn track_stream(&self, roms: &RomStore, track: u16) -> Result<Option<RomPointer>>;

    /// Read the stream header at `pointer`
    fn stream_info(&self, roms: &RomStore, pointer: RomPointer) -> Result<StreamInfo>;

    /// Number of playback channels the cursor can be bound to
    fn channel_count(&self) -> u8;

    /// Point the playback cursor at a stream
    fn load_audio_stream(
        &mut self,
        roms: &RomStore,
        channel: u8,
        pointer: RomPointer,
        mixing_level: u8,
    ) -> Result<()>;

    /// Advance the cursor by one sample
    fn next_sample(&mut self, roms: &RomStore) -> Result<i16>;
}
