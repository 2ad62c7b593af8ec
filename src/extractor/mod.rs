//! Stream extraction
//!
//! Drives a [`DecodeEngine`]'s single playback cursor to pull whole streams
//! out of the ROM set and wrap them in WAV containers.
//!
//! The cursor is modeled explicitly: the extractor tracks a [`CursorState`]
//! and hands out a [`StreamCursor`] session that mutably borrows both the
//! engine and the state, so two pulls can never interleave on one engine.

mod session;

pub use session::StreamCursor;

use crate::config::ExtractConfig;
use crate::engine::{DecodeEngine, StreamInfo};
use crate::export::wav::AudioBuffer;
use crate::resolver::PointerResolver;
use crate::rom::{RomPointer, RomStore};
use crate::{DcsError, Result};

/// Lifecycle of the engine's playback cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No stream in flight; a new one may be loaded
    Idle,
    /// A session is pulling samples from `pointer`
    Streaming {
        /// Stream being played
        pointer: RomPointer,
        /// Samples still to be pulled
        remaining: u32,
    },
    /// The engine reported a fault; only a soft reset clears this
    Faulted,
}

/// Owns a decode engine and its cursor state
#[derive(Debug)]
pub struct StreamExtractor<E: DecodeEngine> {
    engine: E,
    state: CursorState,
}

impl<E: DecodeEngine> StreamExtractor<E> {
    /// Wrap an engine with an idle cursor
    pub fn new(engine: E) -> Self {
        StreamExtractor {
            engine,
            state: CursorState::Idle,
        }
    }

    /// Borrow the engine
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Mutably borrow the engine (volume, completeness checks)
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Current cursor state
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Reset the engine and clear a latched fault
    pub fn soft_reset(&mut self) {
        self.engine.soft_boot();
        self.state = CursorState::Idle;
        tracing::debug!("engine soft reset");
    }

    /// Resolver over this extractor's engine
    pub fn resolver<'a>(&'a self, roms: &'a RomStore) -> PointerResolver<'a, E> {
        PointerResolver::new(roms, &self.engine)
    }

    /// Every track id whose table entry holds a stream, ascending
    pub fn list_streams(&self, roms: &RomStore) -> Result<Vec<u16>> {
        let max = self.engine.max_track_number(roms)?;
        let mut streams = Vec::new();
        for id in 0..=max {
            if self.engine.track_stream(roms, id)?.is_some() {
                streams.push(id);
            }
        }
        Ok(streams)
    }

    /// Stream metadata at `pointer`
    pub fn stream_info(&self, roms: &RomStore, pointer: RomPointer) -> Result<StreamInfo> {
        self.engine.stream_info(roms, pointer)
    }

    /// Load a stream into the cursor and return the pulling session
    ///
    /// Fails without touching the engine when the cursor is faulted or the
    /// channel is out of range. An engine failure while loading latches the
    /// fault.
    pub fn open_cursor<'a>(
        &'a mut self,
        roms: &'a RomStore,
        pointer: RomPointer,
        channel: u8,
        mixing_level: u8,
        samples: u32,
    ) -> Result<StreamCursor<'a, E>> {
        if self.state == CursorState::Faulted {
            return Err(DcsError::EngineFault(
                "cursor is faulted; soft reset required".into(),
            ));
        }
        if channel >= self.engine.channel_count() {
            return Err(DcsError::InvalidChannel(channel));
        }

        if let Err(e) = self
            .engine
            .load_audio_stream(roms, channel, pointer, mixing_level)
        {
            if matches!(e, DcsError::EngineFault(_)) {
                self.state = CursorState::Faulted;
            }
            return Err(e);
        }

        self.state = CursorState::Streaming {
            pointer,
            remaining: samples,
        };
        Ok(StreamCursor::new(&mut self.engine, roms, &mut self.state))
    }

    /// Decode the stream at `pointer` into a WAV container
    pub fn extract(
        &mut self,
        roms: &RomStore,
        pointer: RomPointer,
        mixing_level: u8,
        channel: u8,
    ) -> Result<AudioBuffer> {
        if self.state == CursorState::Faulted {
            return Err(DcsError::EngineFault(
                "cursor is faulted; soft reset required".into(),
            ));
        }

        let info = self.engine.stream_info(roms, pointer)?;
        let stream_bytes = info.byte_count();
        let mut buffer = AudioBuffer::for_stream(stream_bytes)?;

        let cursor = self.open_cursor(roms, pointer, channel, mixing_level, info.sample_count())?;
        for sample in cursor {
            buffer.push_sample(sample?);
        }

        if !buffer.is_complete() {
            self.state = CursorState::Faulted;
            return Err(DcsError::EngineFault(format!(
                "stream at {} produced {} of {} bytes",
                pointer,
                buffer.data_len(),
                stream_bytes
            )));
        }

        tracing::info!(
            %pointer,
            frames = info.frame_count(),
            bytes = buffer.len(),
            "extracted stream"
        );
        Ok(buffer)
    }

    /// Extract using the mixing level and channel from `config`
    pub fn extract_with_config(
        &mut self,
        roms: &RomStore,
        pointer: RomPointer,
        config: &ExtractConfig,
    ) -> Result<AudioBuffer> {
        self.extract(roms, pointer, config.mixing_level, config.channel)
    }
}
