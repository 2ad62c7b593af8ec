//! ROM Audio Stream Extractor
//!
//! Pulls compressed audio streams out of sound-board ROM images and packages
//! them as playable 16-bit mono WAV containers. The bitstream itself is decoded
//! by a [`DecodeEngine`]; this crate owns the ROM banks, resolves stream ids
//! and addresses into validated pointers, drives the engine's sample cursor to
//! completion and writes the container header around the decoded samples.
//!
//! # Features
//! - Owned ROM banks keyed by chip-select, copied on load
//! - Validated pointer resolution by track id or linear address
//! - Explicit single-cursor session with fault latching and soft reset
//! - Bit-exact 44-byte RIFF/WAVE header with post-hoc length patching
//!
//! # Crate feature flags
//! - `raw-engine` (default): reference engine for uncompressed ROM layouts (`engine::raw`)
//! - `cli` (default): the `dcs-extract` command-line tool
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "raw-engine")]
//! # {
//! use dcs_extract::{Decoder, RawPcmEngine, StreamRef};
//!
//! let mut decoder = Decoder::new(RawPcmEngine::new());
//! decoder.load_bank(0, &std::fs::read("sound.u0").unwrap()).unwrap();
//! assert_eq!(decoder.check_completeness(), 0);
//!
//! for id in decoder.list_streams().unwrap() {
//!     let wav = decoder.extract_stream(StreamRef::Track(id)).unwrap();
//!     wav.write_to(format!("stream_{id}.wav")).unwrap();
//! }
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod decoder;
pub mod engine;
pub mod export;
pub mod extractor;
pub mod resolver;
pub mod rom;

/// Error types for ROM stream extraction
#[derive(thiserror::Error, Debug)]
pub enum DcsError {
    /// A chip-select was referenced that has no loaded bank
    #[error("No ROM bank loaded for chip-select {0}")]
    InvalidBank(u8),

    /// An address does not fall inside any loaded bank
    #[error("Address {address:#010x} is out of range: {reason}")]
    OutOfRangePointer {
        /// Linear address that failed to resolve
        address: u32,
        /// Why the address was rejected
        reason: String,
    },

    /// A stream id beyond the engine's maximum track number
    #[error("Stream id {id} exceeds maximum track number {max}")]
    InvalidStreamId {
        /// Requested stream id
        id: u16,
        /// Maximum track number reported by the engine
        max: u16,
    },

    /// The track table entry exists but holds no stream
    #[error("Track {0} has no stream")]
    TrackWithoutStream(u16),

    /// Decode engine reported malformed data or a cursor failure
    #[error("Engine fault: {0}")]
    EngineFault(String),

    /// The loaded ROM set did not pass the engine's completeness check
    #[error("Incomplete ROM set (status {status:#04x})")]
    IncompleteRomSet {
        /// Nonzero engine status code
        status: u8,
    },

    /// Channel number outside the engine's channel range
    #[error("Invalid channel {0}")]
    InvalidChannel(u8),

    /// A bank was loaded twice under a reject policy
    #[error("Chip-select {0} already has a loaded bank")]
    DuplicateBank(u8),

    /// A bank does not fit into the per-chip address window
    #[error("Bank for chip-select {chip_select} is {len} bytes, larger than the bank window")]
    BankTooLarge {
        /// Chip-select of the rejected bank
        chip_select: u8,
        /// Size of the rejected data
        len: usize,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// IO error from filesystem
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for DcsError {
    /// Converts a String into `DcsError::Other`.
    ///
    /// Prefer a specific variant where one fits; callers match on
    /// `EngineFault` and `IncompleteRomSet` to decide whether a soft reset
    /// or a reload is needed.
    fn from(msg: String) -> Self {
        DcsError::Other(msg)
    }
}

impl From<&str> for DcsError {
    fn from(msg: &str) -> Self {
        DcsError::Other(msg.to_string())
    }
}

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, DcsError>;

// Public API exports
pub use config::ExtractConfig;
pub use decoder::{Decoder, SharedDecoder};
pub use engine::{DecodeEngine, StreamInfo};
pub use export::wav::AudioBuffer;
pub use extractor::{CursorState, StreamCursor, StreamExtractor};
pub use resolver::{PointerResolver, StreamRef};
pub use rom::{DuplicateBankPolicy, RomBank, RomPointer, RomStore};

#[cfg(feature = "raw-engine")]
pub use engine::raw::{RawPcmEngine, RomCheck, StreamFormat};
