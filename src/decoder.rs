//! Decoder facade
//!
//! [`Decoder`] bundles a ROM store, an extractor driving one decode engine and
//! the active [`ExtractConfig`]. Every query that needs the engine to read
//! the ROM set first runs the engine's completeness check, so a half-loaded
//! set is reported as [`DcsError::IncompleteRomSet`] instead of as an
//! arbitrary engine fault.

use crate::config::ExtractConfig;
use crate::engine::{DecodeEngine, StreamInfo};
use crate::export::wav::AudioBuffer;
use crate::extractor::{CursorState, StreamExtractor};
use crate::resolver::StreamRef;
use crate::rom::{self, RomFile, RomStore};
use crate::{DcsError, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// A decoder shared between threads; the lock serializes extractions
pub type SharedDecoder<E> = Arc<Mutex<Decoder<E>>>;

/// ROM set plus decode engine, exposing the extraction operations
#[derive(Debug)]
pub struct Decoder<E: DecodeEngine> {
    roms: RomStore,
    extractor: StreamExtractor<E>,
    config: ExtractConfig,
}

impl<E: DecodeEngine> Decoder<E> {
    /// Create a decoder with default settings
    pub fn new(engine: E) -> Self {
        let mut decoder = Decoder {
            roms: RomStore::new(),
            extractor: StreamExtractor::new(engine),
            config: ExtractConfig::default(),
        };
        decoder.set_volume(decoder.config.volume);
        decoder
    }

    /// Create a decoder and apply `config`
    ///
    /// Fails with `ConfigError` when the configured channel is outside the
    /// engine's range.
    pub fn with_config(engine: E, config: ExtractConfig) -> Result<Self> {
        config.validate(engine.channel_count())?;
        let mut decoder = Decoder {
            roms: RomStore::with_policy(config.duplicate_banks),
            extractor: StreamExtractor::new(engine),
            config,
        };
        decoder.set_volume(config.volume);
        Ok(decoder)
    }

    /// Active settings
    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    /// Loaded ROM banks
    pub fn rom_store(&self) -> &RomStore {
        &self.roms
    }

    /// The wrapped engine
    pub fn engine(&self) -> &E {
        self.extractor.engine()
    }

    /// State of the engine's playback cursor
    pub fn cursor_state(&self) -> CursorState {
        self.extractor.state()
    }

    /// Copy a ROM image into the bank for `chip_select`
    pub fn load_bank(&mut self, chip_select: u8, bytes: &[u8]) -> Result<()> {
        self.roms.load_bank(chip_select, bytes)
    }

    /// Read and load every file of a discovered ROM set
    pub fn load_rom_set(&mut self, files: &[RomFile]) -> Result<()> {
        for file in files {
            let bytes = std::fs::read(&file.path)?;
            tracing::debug!(path = %file.path.display(), chip_select = file.chip_select, "reading ROM dump");
            self.load_bank(file.chip_select, &bytes)?;
        }
        Ok(())
    }

    /// Discover and load the ROM dumps in `dir`, returning how many were read
    pub fn load_rom_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<usize> {
        let files = rom::discover(dir.as_ref())?;
        if files.is_empty() {
            return Err(DcsError::Other(format!(
                "no ROM dumps found in {}",
                dir.as_ref().display()
            )));
        }
        self.load_rom_set(&files)?;
        Ok(files.len())
    }

    /// Engine status for the loaded bank set; 0 means complete
    pub fn check_completeness(&mut self) -> u8 {
        self.extractor.engine_mut().check_roms(&self.roms)
    }

    /// Fail with `IncompleteRomSet` unless the bank set checks out
    pub fn ensure_complete(&mut self) -> Result<()> {
        match self.check_completeness() {
            0 => Ok(()),
            status => {
                tracing::debug!(status, "ROM set incomplete");
                Err(DcsError::IncompleteRomSet { status })
            }
        }
    }

    /// Reset the engine, clearing any latched fault
    pub fn soft_reset(&mut self) {
        self.extractor.soft_reset();
    }

    /// Identification string of the ROM set
    pub fn signature(&mut self) -> Result<String> {
        self.ensure_complete()?;
        self.extractor.engine().signature(&self.roms)
    }

    /// Set both the live volume and the one restored by a soft reset
    pub fn set_volume(&mut self, level: u8) {
        let engine = self.extractor.engine_mut();
        engine.set_master_volume(level);
        engine.set_default_volume(level);
        self.config.volume = level;
    }

    /// Highest valid stream id
    pub fn max_track_number(&mut self) -> Result<u16> {
        self.ensure_complete()?;
        self.extractor.engine().max_track_number(&self.roms)
    }

    /// Stream ids whose track entry holds a stream
    pub fn list_streams(&mut self) -> Result<Vec<u16>> {
        self.ensure_complete()?;
        self.extractor.list_streams(&self.roms)
    }

    /// Header information for a stream
    pub fn stream_info(&mut self, stream: StreamRef) -> Result<StreamInfo> {
        self.ensure_complete()?;
        let pointer = self.extractor.resolver(&self.roms).resolve_ref(stream)?;
        self.extractor.stream_info(&self.roms, pointer)
    }

    /// Decode a stream with the configured mixing level and channel
    pub fn extract_stream(&mut self, stream: StreamRef) -> Result<AudioBuffer> {
        let (mixing_level, channel) = (self.config.mixing_level, self.config.channel);
        self.extract_stream_with(stream, mixing_level, channel)
    }

    /// Decode a stream with an explicit mixing level and channel
    ///
    /// A latched fault is reported before the completeness check, so a
    /// faulted decoder answers `EngineFault` until it is soft reset.
    pub fn extract_stream_with(
        &mut self,
        stream: StreamRef,
        mixing_level: u8,
        channel: u8,
    ) -> Result<AudioBuffer> {
        if self.cursor_state() == CursorState::Faulted {
            return Err(DcsError::EngineFault(
                "cursor is faulted; soft reset required".into(),
            ));
        }
        self.ensure_complete()?;
        let pointer = self.extractor.resolver(&self.roms).resolve_ref(stream)?;
        tracing::debug!(%stream, %pointer, mixing_level, channel, "extracting");
        self.extractor
            .extract(&self.roms, pointer, mixing_level, channel)
    }

    /// Move the decoder behind a lock for use from several threads
    pub fn into_shared(self) -> SharedDecoder<E> {
        Arc::new(Mutex::new(self))
    }
}

#[cfg(all(test, feature = "raw-engine"))]
mod tests {
    use super::*;
    use crate::engine::raw::{RawPcmEngine, RawRomBuilder};
    use crate::rom::DuplicateBankPolicy;

    fn decoder_with(builder: &RawRomBuilder) -> Decoder<RawPcmEngine> {
        let mut decoder = Decoder::new(RawPcmEngine::new());
        for (cs, data) in builder.build() {
            decoder.load_bank(cs, &data).unwrap();
        }
        decoder
    }

    #[test]
    fn test_queries_require_complete_set() {
        let mut decoder = Decoder::new(RawPcmEngine::new());
        assert_ne!(decoder.check_completeness(), 0);
        assert!(matches!(
            decoder.signature(),
            Err(DcsError::IncompleteRomSet { status: 0x01 })
        ));
        assert!(matches!(
            decoder.extract_stream(StreamRef::Track(0)),
            Err(DcsError::IncompleteRomSet { .. })
        ));
    }

    #[test]
    fn test_signature_and_listing() {
        let mut builder = RawRomBuilder::new("TEST SET 1.0", 1);
        let a = builder.add_silence(0, 2);
        builder.add_track(Some(a));
        builder.add_track(None);
        builder.add_track(Some(a));

        let mut decoder = decoder_with(&builder);
        assert_eq!(decoder.check_completeness(), 0);
        assert_eq!(decoder.signature().unwrap(), "TEST SET 1.0");
        assert_eq!(decoder.max_track_number().unwrap(), 2);
        assert_eq!(decoder.list_streams().unwrap(), vec![0, 2]);
        assert_eq!(
            decoder.stream_info(StreamRef::Track(2)).unwrap().byte_count(),
            960
        );
    }

    #[test]
    fn test_volume_survives_soft_reset() {
        let mut builder = RawRomBuilder::new("VOL", 1);
        let s = builder.add_pcm_stream(0, 0, &[1000; 240]);
        builder.add_track(Some(s));

        let mut decoder = decoder_with(&builder);
        decoder.set_volume(51);
        decoder.soft_reset();
        assert_eq!(decoder.engine().master_volume(), 51);

        let wav = decoder.extract_stream(StreamRef::Track(0)).unwrap();
        assert_eq!(&wav.samples()[..2], &200i16.to_le_bytes());
    }

    #[test]
    fn test_extract_with_overrides() {
        let mut builder = RawRomBuilder::new("MIX", 1);
        let s = builder.add_pcm_stream(0, 0, &[1000; 240]);
        builder.add_track(Some(s));

        let mut decoder = decoder_with(&builder);
        let wav = decoder
            .extract_stream_with(StreamRef::Track(0), 50, 3)
            .unwrap();
        assert_eq!(&wav.samples()[..2], &500i16.to_le_bytes());
        assert!(matches!(
            decoder.extract_stream_with(StreamRef::Track(0), 50, 8),
            Err(DcsError::InvalidChannel(8))
        ));
        assert_eq!(decoder.cursor_state(), CursorState::Idle);
    }

    #[test]
    fn test_with_config() {
        let config = ExtractConfig::default().channel(8);
        assert!(Decoder::with_config(RawPcmEngine::new(), config).is_err());

        let config = ExtractConfig::default()
            .volume(100)
            .reject_duplicate_banks(true);
        let mut decoder = Decoder::with_config(RawPcmEngine::new(), config).unwrap();
        assert_eq!(decoder.rom_store().policy(), DuplicateBankPolicy::Reject);
        assert_eq!(decoder.engine().default_volume(), 100);

        decoder.load_bank(0, &[0; 16]).unwrap();
        assert!(matches!(
            decoder.load_bank(0, &[0; 16]),
            Err(DcsError::DuplicateBank(0))
        ));
    }
}
