//! Pointer resolution
//!
//! Turns caller-facing stream references (track ids or linear addresses)
//! into [`RomPointer`]s that are known to land inside a loaded bank.

use crate::engine::DecodeEngine;
use crate::rom::{RomPointer, RomStore};
use crate::{DcsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A stream addressed by track id or by linear ROM address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamRef {
    /// Index into the engine's track table
    Track(u16),
    /// Linear address of a stream header (chip-select in the top byte)
    Address(u32),
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRef::Track(id) => write!(f, "{}", id),
            StreamRef::Address(addr) => write!(f, "@{:08x}", addr),
        }
    }
}

impl FromStr for StreamRef {
    type Err = DcsError;

    /// Parses `12` as a track id and `@1a2b` / `@0x1a2b` as a hex address
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('@') {
            let hex = hex
                .strip_prefix("0x")
                .or_else(|| hex.strip_prefix("0X"))
                .unwrap_or(hex);
            return u32::from_str_radix(hex, 16)
                .map(StreamRef::Address)
                .map_err(|e| DcsError::ConfigError(format!("invalid stream address '{}': {}", s, e)));
        }
        s.parse::<u16>()
            .map(StreamRef::Track)
            .map_err(|e| DcsError::ConfigError(format!("invalid stream id '{}': {}", s, e)))
    }
}

/// Resolves stream references against a ROM store and an engine's track table
pub struct PointerResolver<'a, E: DecodeEngine + ?Sized> {
    roms: &'a RomStore,
    engine: &'a E,
}

impl<'a, E: DecodeEngine + ?Sized> PointerResolver<'a, E> {
    /// Bind a resolver to a store and engine
    pub fn new(roms: &'a RomStore, engine: &'a E) -> Self {
        PointerResolver { roms, engine }
    }

    /// Map a track id to the pointer of the stream it plays
    pub fn resolve(&self, stream_id: u16) -> Result<RomPointer> {
        let max = self.engine.max_track_number(self.roms)?;
        if stream_id > max {
            return Err(DcsError::InvalidStreamId { id: stream_id, max });
        }

        let pointer = self
            .engine
            .track_stream(self.roms, stream_id)?
            .ok_or(DcsError::TrackWithoutStream(stream_id))?;
        tracing::debug!(stream_id, %pointer, "resolved track");
        Ok(pointer)
    }

    /// Map a linear address to a pointer, rejecting addresses outside every
    /// loaded bank
    pub fn resolve_raw(&self, address: u32) -> Result<RomPointer> {
        self.roms.resolve_linear(address)
    }

    /// Resolve either kind of reference
    pub fn resolve_ref(&self, stream: StreamRef) -> Result<RomPointer> {
        match stream {
            StreamRef::Track(id) => self.resolve(id),
            StreamRef::Address(address) => self.resolve_raw(address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stream_ref() {
        assert_eq!("7".parse::<StreamRef>().unwrap(), StreamRef::Track(7));
        assert_eq!(
            "@0x0100002c".parse::<StreamRef>().unwrap(),
            StreamRef::Address(0x0100_002C)
        );
        assert_eq!("@2C".parse::<StreamRef>().unwrap(), StreamRef::Address(0x2C));
        assert!("70000".parse::<StreamRef>().is_err());
        assert!("@xyz".parse::<StreamRef>().is_err());
        assert!("-1".parse::<StreamRef>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for r in [StreamRef::Track(12), StreamRef::Address(0x0300_1234)] {
            assert_eq!(r.to_string().parse::<StreamRef>().unwrap(), r);
        }
    }

    #[cfg(feature = "raw-engine")]
    #[test]
    fn test_resolve_bounds() {
        use crate::engine::raw::{RawPcmEngine, RawRomBuilder};

        let mut builder = RawRomBuilder::new("SET", 1);
        let s = builder.add_silence(0, 1);
        builder.add_track(Some(s));
        builder.add_track(None);
        builder.add_track(Some(s));

        let mut roms = RomStore::new();
        for (cs, data) in builder.build() {
            roms.load_bank(cs, &data).unwrap();
        }
        let engine = RawPcmEngine::new();
        let resolver = PointerResolver::new(&roms, &engine);

        let first = resolver.resolve(0).unwrap();
        assert_eq!(resolver.resolve(2).unwrap(), first);
        assert!(matches!(resolver.resolve(1), Err(DcsError::TrackWithoutStream(1))));
        assert!(matches!(
            resolver.resolve(3),
            Err(DcsError::InvalidStreamId { id: 3, max: 2 })
        ));

        assert_eq!(resolver.resolve_raw(first.linear()).unwrap(), first);
        assert!(matches!(
            resolver.resolve_ref(StreamRef::Address(0x0200_0000)),
            Err(DcsError::OutOfRangePointer { .. })
        ));
    }
}
