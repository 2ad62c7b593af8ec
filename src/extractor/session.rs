//! Cursor session
//!
//! A `StreamCursor` is the only handle through which samples are pulled from
//! the engine. It exists between a successful `load_audio_stream` and the
//! last sample of the stream; its transitions are reflected in the owning
//! extractor's [`CursorState`].

use super::CursorState;
use crate::engine::DecodeEngine;
use crate::rom::RomStore;
use crate::{DcsError, Result};

/// Sequential sample puller bound to one loaded stream
pub struct StreamCursor<'a, E: DecodeEngine> {
    engine: &'a mut E,
    roms: &'a RomStore,
    state: &'a mut CursorState,
}

impl<'a, E: DecodeEngine> StreamCursor<'a, E> {
    pub(super) fn new(engine: &'a mut E, roms: &'a RomStore, state: &'a mut CursorState) -> Self {
        StreamCursor {
            engine,
            roms,
            state,
        }
    }

    /// Samples left before the stream ends
    pub fn remaining(&self) -> u32 {
        match *self.state {
            CursorState::Streaming { remaining, .. } => remaining,
            _ => 0,
        }
    }

    /// Pull the next sample, or `None` once the stream is exhausted
    ///
    /// Any engine error moves the cursor to `Faulted` and is reported as
    /// `EngineFault`.
    pub fn next_sample(&mut self) -> Result<Option<i16>> {
        let (pointer, remaining) = match *self.state {
            CursorState::Streaming { pointer, remaining } => (pointer, remaining),
            CursorState::Idle => return Ok(None),
            CursorState::Faulted => {
                return Err(DcsError::EngineFault(
                    "cursor is faulted; soft reset required".into(),
                ))
            }
        };

        if remaining == 0 {
            *self.state = CursorState::Idle;
            return Ok(None);
        }

        match self.engine.next_sample(self.roms) {
            Ok(sample) => {
                *self.state = if remaining == 1 {
                    CursorState::Idle
                } else {
                    CursorState::Streaming {
                        pointer,
                        remaining: remaining - 1,
                    }
                };
                Ok(Some(sample))
            }
            Err(e) => {
                tracing::warn!(%pointer, remaining, error = %e, "engine fault mid-stream");
                *self.state = CursorState::Faulted;
                Err(match e {
                    DcsError::EngineFault(_) => e,
                    other => DcsError::EngineFault(other.to_string()),
                })
            }
        }
    }
}

impl<E: DecodeEngine> Iterator for StreamCursor<'_, E> {
    type Item = Result<i16>;

    /// Yields each sample; after the first error the iterator ends
    fn next(&mut self) -> Option<Self::Item> {
        if *self.state == CursorState::Faulted {
            return None;
        }
        self.next_sample().transpose()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining() as usize;
        (0, Some(remaining))
    }
}

impl<E: DecodeEngine> Drop for StreamCursor<'_, E> {
    fn drop(&mut self) {
        // An abandoned session leaves nothing to resume; the next load restarts
        if let CursorState::Streaming { .. } = *self.state {
            *self.state = CursorState::Idle;
        }
    }
}
