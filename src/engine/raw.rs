//! Raw PCM ROM Engine
//!
//! Reference [`DecodeEngine`] for sound ROMs that store uncompressed 16-bit
//! streams. Useful for diagnostics, for repackaged sample sets, and as a
//! stand-in for a real bitstream decoder in tests.
//!
//! Layout (all multi-byte values big-endian):
//! - Every bank starts with the tag `"RSB"` followed by its own chip-select.
//! - Bank 0 continues at offset 4 with the program header:
//!   `"RSND"`, u8 required bank count, u8 version (1), u16 track count,
//!   32-byte NUL-padded signature, then one u32 linear stream address per
//!   track (`0xFFFFFFFF` for tracks without a stream).
//! - A stream starts with u16 frame count, u8 format type, u8 format subtype.
//!   Every frame opens with the sync word `0xA55A`; `Pcm16` frames follow it
//!   with 240 samples, `Silence` frames carry nothing else.

use super::{DecodeEngine, StreamInfo, SAMPLES_PER_FRAME};
use crate::rom::{RomPointer, RomStore, BANK_ADDRESS_BITS};
use crate::{DcsError, Result};
use bitflags::bitflags;
use nom::bytes::complete::{tag, take};
use nom::multi::count;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::sequence::{preceded, tuple};
use nom::IResult;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::collections::BTreeMap;

/// Bank tag prefix; the fourth byte is the bank's chip-select
pub const BANK_TAG: &[u8; 3] = b"RSB";
/// Program header magic in bank 0
pub const PROGRAM_MAGIC: &[u8; 4] = b"RSND";
/// Supported layout version
pub const LAYOUT_VERSION: u8 = 1;
/// Signature field width
pub const SIGNATURE_LEN: usize = 32;
/// Offset of the first track table entry in bank 0
pub const TRACK_TABLE_OFFSET: u32 = 4 + 4 + 1 + 1 + 2 + SIGNATURE_LEN as u32;
/// Track table entry for a track without a stream
pub const NO_STREAM: u32 = 0xFFFF_FFFF;
/// Word that opens every frame
pub const FRAME_SYNC: u16 = 0xA55A;
/// Size of a stream header
pub const STREAM_HEADER_LEN: u32 = 4;
/// Playback channels
pub const CHANNELS: u8 = 8;

const UNITY_MIXING_LEVEL: i64 = 100;
const FULL_VOLUME: u8 = 255;

bitflags! {
    /// Status bits returned by [`RawPcmEngine::check_roms`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RomCheck: u8 {
        /// No bank loaded at chip-select 0
        const MISSING_PROGRAM = 0x01;
        /// Bank 0 tag, magic or version is wrong
        const BAD_PROGRAM_HEADER = 0x02;
        /// A required bank is not loaded
        const MISSING_BANK = 0x04;
        /// A bank's tag names a different chip-select
        const BANK_MISMATCH = 0x08;
        /// The track table runs past the end of bank 0
        const BAD_TRACK_TABLE = 0x10;
    }
}

/// Sample encodings understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum StreamFormat {
    /// 240 big-endian signed 16-bit samples per frame
    Pcm16 = 0,
    /// Frames carry no sample data and decode to zeros
    Silence = 1,
}

#[derive(Debug, Clone)]
struct ProgramHeader {
    required_banks: u8,
    version: u8,
    track_count: u16,
    signature: String,
}

fn bank_tag(input: &[u8]) -> IResult<&[u8], u8> {
    preceded(tag(&BANK_TAG[..]), be_u8)(input)
}

fn program_header(input: &[u8]) -> IResult<&[u8], ProgramHeader> {
    let (input, _) = tag(&PROGRAM_MAGIC[..])(input)?;
    let (input, (required_banks, version, track_count, signature)) =
        tuple((be_u8, be_u8, be_u16, take(SIGNATURE_LEN)))(input)?;

    let end = signature
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(signature.len());
    let signature = String::from_utf8_lossy(&signature[..end]).into_owned();

    Ok((
        input,
        ProgramHeader {
            required_banks,
            version,
            track_count,
            signature,
        },
    ))
}

fn track_table(input: &[u8], tracks: u16) -> IResult<&[u8], Vec<u32>> {
    count(be_u32, tracks as usize)(input)
}

fn stream_header(input: &[u8]) -> IResult<&[u8], (u16, u8, u8)> {
    tuple((be_u16, be_u8, be_u8))(input)
}

fn fault(context: impl std::fmt::Display) -> impl FnOnce(DcsError) -> DcsError {
    move |e| DcsError::EngineFault(format!("{}: {}", context, e))
}

/// Apply mixing level and master volume, saturating to 16 bits
fn apply_gain(sample: i16, mixing_level: u8, master_volume: u8) -> i16 {
    let scaled = sample as i64 * mixing_level as i64 * master_volume as i64
        / (UNITY_MIXING_LEVEL * FULL_VOLUME as i64);
    scaled.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

#[derive(Debug, Clone)]
struct Cursor {
    channel: u8,
    format: StreamFormat,
    mixing_level: u8,
    next: RomPointer,
    frames_left: u16,
    frame_pos: u32,
}

/// Decode engine for uncompressed ROM streams
#[derive(Debug, Clone)]
pub struct RawPcmEngine {
    master_volume: u8,
    default_volume: u8,
    cursor: Option<Cursor>,
}

impl Default for RawPcmEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RawPcmEngine {
    /// Create an engine at full volume with no stream loaded
    pub fn new() -> Self {
        RawPcmEngine {
            master_volume: FULL_VOLUME,
            default_volume: FULL_VOLUME,
            cursor: None,
        }
    }

    /// Live output volume
    pub fn master_volume(&self) -> u8 {
        self.master_volume
    }

    /// Volume restored on soft boot
    pub fn default_volume(&self) -> u8 {
        self.default_volume
    }

    /// Channel the cursor is bound to, if a stream is loaded
    pub fn active_channel(&self) -> Option<u8> {
        self.cursor.as_ref().map(|c| c.channel)
    }

    fn program(&self, roms: &RomStore) -> Result<ProgramHeader> {
        let data = roms.bank(0)?.data();

        let (rest, chip_select) = bank_tag(data)
            .map_err(|_| DcsError::EngineFault("bank 0 has no bank tag".into()))?;
        if chip_select != 0 {
            return Err(DcsError::EngineFault(format!(
                "bank 0 is tagged as chip-select {}",
                chip_select
            )));
        }

        let (_, header) = program_header(rest)
            .map_err(|_| DcsError::EngineFault("bank 0 has no program header".into()))?;
        if header.version != LAYOUT_VERSION {
            return Err(DcsError::EngineFault(format!(
                "unsupported layout version {}",
                header.version
            )));
        }
        Ok(header)
    }

    fn table_entry(&self, roms: &RomStore, track: u16) -> Result<u32> {
        let ptr = RomPointer::new(0, TRACK_TABLE_OFFSET + track as u32 * 4);
        let bytes = roms
            .read(ptr, 4)
            .map_err(fault(format!("track table entry {}", track)))?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_stream_header(&self, roms: &RomStore, pointer: RomPointer) -> Result<(u16, StreamFormat, u8)> {
        let bytes = roms
            .read(pointer, STREAM_HEADER_LEN as usize)
            .map_err(fault(format!("stream header at {}", pointer)))?;
        let (_, (frames, format_type, sub_type)) = stream_header(bytes)
            .map_err(|_| DcsError::EngineFault(format!("truncated stream header at {}", pointer)))?;

        if frames == 0 {
            return Err(DcsError::EngineFault(format!(
                "stream at {} declares zero frames",
                pointer
            )));
        }
        let format = StreamFormat::from_u8(format_type).ok_or_else(|| {
            DcsError::EngineFault(format!(
                "stream at {} has unknown format type {}",
                pointer, format_type
            ))
        })?;
        Ok((frames, format, sub_type))
    }
}

impl DecodeEngine for RawPcmEngine {
    fn check_roms(&mut self, roms: &RomStore) -> u8 {
        if !roms.contains(0) {
            return RomCheck::MISSING_PROGRAM.bits();
        }

        let header = match self.program(roms) {
            Ok(header) => header,
            Err(e) => {
                tracing::debug!(error = %e, "program bank rejected");
                return RomCheck::BAD_PROGRAM_HEADER.bits();
            }
        };

        let mut status = RomCheck::empty();

        for chip_select in 1..header.required_banks.max(1) {
            match roms.bank(chip_select) {
                Err(_) => status |= RomCheck::MISSING_BANK,
                Ok(bank) => match bank_tag(bank.data()) {
                    Ok((_, tagged)) if tagged == chip_select => {}
                    _ => status |= RomCheck::BANK_MISMATCH,
                },
            }
        }

        let table = roms
            .tail(RomPointer::new(0, TRACK_TABLE_OFFSET))
            .ok()
            .and_then(|rest| track_table(rest, header.track_count).ok());
        match table {
            None => status |= RomCheck::BAD_TRACK_TABLE,
            Some((_, entries)) => {
                // Every stream a track points at must sit inside a loaded bank
                for address in entries.into_iter().filter(|&a| a != NO_STREAM) {
                    let chip_select = (address >> BANK_ADDRESS_BITS) as u8;
                    if !roms.contains(chip_select) {
                        status |= RomCheck::MISSING_BANK;
                    } else if roms.resolve_linear(address).is_err() {
                        status |= RomCheck::BAD_TRACK_TABLE;
                    }
                }
            }
        }

        tracing::debug!(status = status.bits(), "ROM check complete");
        status.bits()
    }

    fn soft_boot(&mut self) {
        self.cursor = None;
        self.master_volume = self.default_volume;
    }

    fn signature(&self, roms: &RomStore) -> Result<String> {
        Ok(self.program(roms)?.signature)
    }

    fn set_master_volume(&mut self, level: u8) {
        self.master_volume = level;
    }

    fn set_default_volume(&mut self, level: u8) {
        self.default_volume = level;
    }

    fn max_track_number(&self, roms: &RomStore) -> Result<u16> {
        let header = self.program(roms)?;
        header
            .track_count
            .checked_sub(1)
            .ok_or_else(|| DcsError::EngineFault("track table is empty".into()))
    }

    fn track_stream(&self, roms: &RomStore, track: u16) -> Result<Option<RomPointer>> {
        let max = self.max_track_number(roms)?;
        if track > max {
            return Err(DcsError::InvalidStreamId { id: track, max });
        }

        match self.table_entry(roms, track)? {
            NO_STREAM => Ok(None),
            address => roms
                .resolve_linear(address)
                .map(Some)
                .map_err(fault(format!("track {}", track))),
        }
    }

    fn stream_info(&self, roms: &RomStore, pointer: RomPointer) -> Result<StreamInfo> {
        let (frames, format, sub_type) = self.read_stream_header(roms, pointer)?;
        Ok(StreamInfo::new(frames, format as u8, sub_type))
    }

    fn channel_count(&self) -> u8 {
        CHANNELS
    }

    fn load_audio_stream(
        &mut self,
        roms: &RomStore,
        channel: u8,
        pointer: RomPointer,
        mixing_level: u8,
    ) -> Result<()> {
        if channel >= CHANNELS {
            return Err(DcsError::InvalidChannel(channel));
        }
        let (frames, format, _) = self.read_stream_header(roms, pointer)?;

        self.cursor = Some(Cursor {
            channel,
            format,
            mixing_level,
            next: pointer.add(STREAM_HEADER_LEN),
            frames_left: frames,
            frame_pos: SAMPLES_PER_FRAME,
        });
        Ok(())
    }

    fn next_sample(&mut self, roms: &RomStore) -> Result<i16> {
        let master_volume = self.master_volume;
        let cursor = self
            .cursor
            .as_mut()
            .ok_or_else(|| DcsError::EngineFault("no stream loaded".into()))?;

        if cursor.frame_pos == SAMPLES_PER_FRAME {
            // Past the last frame the channel plays silence
            if cursor.frames_left == 0 {
                return Ok(0);
            }
            let sync = roms
                .read(cursor.next, 2)
                .map_err(fault("premature end of stream"))?;
            let sync = u16::from_be_bytes([sync[0], sync[1]]);
            if sync != FRAME_SYNC {
                return Err(DcsError::EngineFault(format!(
                    "bad frame sync {:#06x} at {}",
                    sync, cursor.next
                )));
            }
            cursor.next = cursor.next.add(2);
            cursor.frames_left -= 1;
            cursor.frame_pos = 0;
        }

        cursor.frame_pos += 1;
        match cursor.format {
            StreamFormat::Silence => Ok(0),
            StreamFormat::Pcm16 => {
                let bytes = roms
                    .read(cursor.next, 2)
                    .map_err(fault("premature end of stream"))?;
                cursor.next = cursor.next.add(2);
                let sample = i16::from_be_bytes([bytes[0], bytes[1]]);
                Ok(apply_gain(sample, cursor.mixing_level, master_volume))
            }
        }
    }
}

/// Handle to a stream added to a [`RawRomBuilder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle(usize);

#[derive(Debug, Clone)]
struct PendingStream {
    chip_select: u8,
    bytes: Vec<u8>,
}

/// Assembles ROM images in the raw layout
///
/// Streams may be placed in any bank; addresses are fixed up when the image
/// is built, once the size of the bank 0 track table is known.
#[derive(Debug, Clone)]
pub struct RawRomBuilder {
    signature: String,
    required_banks: u8,
    streams: Vec<PendingStream>,
    tracks: Vec<Option<StreamHandle>>,
}

impl RawRomBuilder {
    /// Start a ROM set whose program bank requires banks `0..required_banks`
    pub fn new(signature: &str, required_banks: u8) -> Self {
        RawRomBuilder {
            signature: signature.to_string(),
            required_banks: required_banks.max(1),
            streams: Vec::new(),
            tracks: Vec::new(),
        }
    }

    /// Add a PCM stream; the last frame is zero-padded to 240 samples
    ///
    /// A stream holds at most `u16::MAX` frames; samples beyond that are
    /// dropped.
    pub fn add_pcm_stream(&mut self, chip_select: u8, sub_type: u8, samples: &[i16]) -> StreamHandle {
        let spf = SAMPLES_PER_FRAME as usize;
        let frames = samples.len().div_ceil(spf).clamp(1, u16::MAX as usize);

        let mut bytes = Vec::with_capacity(STREAM_HEADER_LEN as usize + frames * (2 + spf * 2));
        bytes.extend_from_slice(&(frames as u16).to_be_bytes());
        bytes.push(StreamFormat::Pcm16 as u8);
        bytes.push(sub_type);
        for frame in 0..frames {
            bytes.extend_from_slice(&FRAME_SYNC.to_be_bytes());
            for i in 0..spf {
                let sample = samples.get(frame * spf + i).copied().unwrap_or(0);
                bytes.extend_from_slice(&sample.to_be_bytes());
            }
        }
        self.push_stream(chip_select, bytes)
    }

    /// Add a silent stream of `frames` frames (at least one)
    pub fn add_silence(&mut self, chip_select: u8, frames: u16) -> StreamHandle {
        let frames = frames.max(1);
        let mut bytes = Vec::with_capacity(STREAM_HEADER_LEN as usize + frames as usize * 2);
        bytes.extend_from_slice(&frames.to_be_bytes());
        bytes.push(StreamFormat::Silence as u8);
        bytes.push(0);
        for _ in 0..frames {
            bytes.extend_from_slice(&FRAME_SYNC.to_be_bytes());
        }
        self.push_stream(chip_select, bytes)
    }

    fn push_stream(&mut self, chip_select: u8, bytes: Vec<u8>) -> StreamHandle {
        self.streams.push(PendingStream { chip_select, bytes });
        StreamHandle(self.streams.len() - 1)
    }

    /// Append a track entry and return its track number
    pub fn add_track(&mut self, stream: Option<StreamHandle>) -> u16 {
        self.tracks.push(stream);
        (self.tracks.len() - 1) as u16
    }

    /// Produce `(chip_select, image)` pairs for every required bank plus any
    /// bank that holds a stream, in chip-select order
    ///
    /// The required bank count written to the program header is raised to
    /// cover the highest bank holding a stream.
    pub fn build(&self) -> Vec<(u8, Vec<u8>)> {
        let required_banks = self
            .streams
            .iter()
            .map(|s| s.chip_select.saturating_add(1))
            .fold(self.required_banks, u8::max);

        let mut banks: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        for chip_select in 0..required_banks {
            banks.insert(chip_select, tagged_bank(chip_select));
        }
        for stream in &self.streams {
            banks
                .entry(stream.chip_select)
                .or_insert_with(|| tagged_bank(stream.chip_select));
        }

        // Reserve the program header and track table before placing streams
        let table_end = TRACK_TABLE_OFFSET as usize + self.tracks.len() * 4;
        if let Some(program) = banks.get_mut(&0) {
            program.resize(table_end, 0);
        }

        let mut addresses = Vec::with_capacity(self.streams.len());
        for stream in &self.streams {
            let bank = banks
                .entry(stream.chip_select)
                .or_insert_with(|| tagged_bank(stream.chip_select));
            let address = ((stream.chip_select as u32) << BANK_ADDRESS_BITS) | bank.len() as u32;
            bank.extend_from_slice(&stream.bytes);
            addresses.push(address);
        }

        if let Some(program) = banks.get_mut(&0) {
            let mut header = Vec::with_capacity(table_end - 4);
            header.extend_from_slice(PROGRAM_MAGIC);
            header.push(required_banks);
            header.push(LAYOUT_VERSION);
            header.extend_from_slice(&(self.tracks.len() as u16).to_be_bytes());
            let mut signature = [0u8; SIGNATURE_LEN];
            let sig = self.signature.as_bytes();
            let n = sig.len().min(SIGNATURE_LEN);
            signature[..n].copy_from_slice(&sig[..n]);
            header.extend_from_slice(&signature);
            for track in &self.tracks {
                let address = track.map_or(NO_STREAM, |h| addresses[h.0]);
                header.extend_from_slice(&address.to_be_bytes());
            }
            program[4..table_end].copy_from_slice(&header);
        }

        banks.into_iter().collect()
    }
}

fn tagged_bank(chip_select: u8) -> Vec<u8> {
    let mut bank = Vec::with_capacity(0x100);
    bank.extend_from_slice(BANK_TAG);
    bank.push(chip_select);
    bank
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_from(banks: Vec<(u8, Vec<u8>)>) -> RomStore {
        let mut store = RomStore::new();
        for (cs, data) in banks {
            store.load_bank(cs, &data).unwrap();
        }
        store
    }

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i as i16).wrapping_mul(97)).collect()
    }

    #[test]
    fn test_check_roms_ok() {
        let mut builder = RawRomBuilder::new("TEST SOUND L-1", 2);
        let s = builder.add_pcm_stream(1, 0, &ramp(240));
        builder.add_track(Some(s));

        let store = store_from(builder.build());
        let mut engine = RawPcmEngine::new();
        assert_eq!(engine.check_roms(&store), 0);
        assert_eq!(engine.signature(&store).unwrap(), "TEST SOUND L-1");
        assert_eq!(engine.max_track_number(&store).unwrap(), 0);
    }

    #[test]
    fn test_check_roms_status_bits() {
        let mut engine = RawPcmEngine::new();
        let empty = RomStore::new();
        assert_eq!(engine.check_roms(&empty), RomCheck::MISSING_PROGRAM.bits());

        let zeroed = store_from(vec![(0, vec![0u8; 0x10000])]);
        assert_eq!(engine.check_roms(&zeroed), RomCheck::BAD_PROGRAM_HEADER.bits());

        let banks = RawRomBuilder::new("SET", 4).build();
        let program_only = store_from(vec![banks[0].clone()]);
        assert_eq!(engine.check_roms(&program_only), RomCheck::MISSING_BANK.bits());

        let mut swapped = RomStore::new();
        swapped.load_bank(0, &banks[0].1).unwrap();
        swapped.load_bank(1, &banks[2].1).unwrap();
        swapped.load_bank(2, &banks[1].1).unwrap();
        swapped.load_bank(3, &banks[3].1).unwrap();
        assert_eq!(engine.check_roms(&swapped), RomCheck::BANK_MISMATCH.bits());
    }

    #[test]
    fn test_truncated_track_table() {
        let mut builder = RawRomBuilder::new("SET", 1);
        builder.add_track(None);
        builder.add_track(None);
        let mut bank0 = builder.build().remove(0).1;
        bank0.truncate(TRACK_TABLE_OFFSET as usize + 6);

        let store = store_from(vec![(0, bank0)]);
        let mut engine = RawPcmEngine::new();
        assert_eq!(engine.check_roms(&store), RomCheck::BAD_TRACK_TABLE.bits());
    }

    #[test]
    fn test_track_pointing_outside_loaded_banks() {
        let mut builder = RawRomBuilder::new("SET", 1);
        let s = builder.add_silence(0, 1);
        builder.add_track(Some(s));
        let banks = builder.build();
        let entry = TRACK_TABLE_OFFSET as usize;
        let mut engine = RawPcmEngine::new();

        let mut foreign = banks[0].1.clone();
        foreign[entry..entry + 4].copy_from_slice(&0x0500_0004u32.to_be_bytes());
        let store = store_from(vec![(0, foreign)]);
        assert_eq!(engine.check_roms(&store), RomCheck::MISSING_BANK.bits());

        let mut past_end = banks[0].1.clone();
        past_end[entry..entry + 4].copy_from_slice(&0x00FF_FFF0u32.to_be_bytes());
        let store = store_from(vec![(0, past_end)]);
        assert_eq!(engine.check_roms(&store), RomCheck::BAD_TRACK_TABLE.bits());
    }

    #[test]
    fn test_builder_requires_stream_banks() {
        let mut builder = RawRomBuilder::new("SET", 1);
        let s = builder.add_silence(2, 1);
        builder.add_track(Some(s));
        let banks = builder.build();
        assert_eq!(banks.iter().map(|(cs, _)| *cs).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(banks[0].1[8], 3);

        let mut engine = RawPcmEngine::new();
        assert_eq!(engine.check_roms(&store_from(banks)), 0);
    }

    #[test]
    fn test_builder_never_writes_empty_streams() {
        let mut builder = RawRomBuilder::new("SET", 1);
        let silent = builder.add_silence(0, 0);
        let pcm = builder.add_pcm_stream(0, 0, &[]);
        builder.add_track(Some(silent));
        builder.add_track(Some(pcm));
        let store = store_from(builder.build());

        let engine = RawPcmEngine::new();
        for track in 0..2 {
            let ptr = engine.track_stream(&store, track).unwrap().unwrap();
            assert_eq!(engine.stream_info(&store, ptr).unwrap().frame_count(), 1);
        }
    }

    #[test]
    fn test_track_without_stream() {
        let mut builder = RawRomBuilder::new("SET", 1);
        builder.add_track(None);
        let store = store_from(builder.build());
        let engine = RawPcmEngine::new();
        assert_eq!(engine.track_stream(&store, 0).unwrap(), None);
        assert!(matches!(
            engine.track_stream(&store, 1),
            Err(DcsError::InvalidStreamId { id: 1, max: 0 })
        ));
    }

    #[test]
    fn test_pcm_cursor_reads_samples() {
        let samples = ramp(300);
        let mut builder = RawRomBuilder::new("SET", 1);
        let s = builder.add_pcm_stream(0, 7, &samples);
        builder.add_track(Some(s));
        let store = store_from(builder.build());

        let mut engine = RawPcmEngine::new();
        let ptr = engine.track_stream(&store, 0).unwrap().unwrap();
        let info = engine.stream_info(&store, ptr).unwrap();
        assert_eq!(info.frame_count(), 2);
        assert_eq!(info.format_type(), StreamFormat::Pcm16 as u8);
        assert_eq!(info.format_sub_type(), 7);

        engine.load_audio_stream(&store, 0, ptr, 0x64).unwrap();
        let decoded: Vec<i16> = (0..480).map(|_| engine.next_sample(&store).unwrap()).collect();
        assert_eq!(&decoded[..300], &samples[..]);
        assert!(decoded[300..].iter().all(|&s| s == 0));

        // Exhausted cursor keeps producing silence
        assert_eq!(engine.next_sample(&store).unwrap(), 0);
    }

    #[test]
    fn test_silence_stream() {
        let mut builder = RawRomBuilder::new("SET", 1);
        let s = builder.add_silence(0, 3);
        builder.add_track(Some(s));
        let store = store_from(builder.build());

        let mut engine = RawPcmEngine::new();
        let ptr = engine.track_stream(&store, 0).unwrap().unwrap();
        assert_eq!(engine.stream_info(&store, ptr).unwrap().frame_count(), 3);
        engine.load_audio_stream(&store, 2, ptr, 0x64).unwrap();
        assert_eq!(engine.active_channel(), Some(2));
        for _ in 0..720 {
            assert_eq!(engine.next_sample(&store).unwrap(), 0);
        }
    }

    #[test]
    fn test_bad_sync_faults() {
        let mut builder = RawRomBuilder::new("SET", 1);
        let s = builder.add_pcm_stream(0, 0, &ramp(240));
        builder.add_track(Some(s));
        let mut banks = builder.build();
        let ptr_offset = TRACK_TABLE_OFFSET as usize + 4;
        banks[0].1[ptr_offset + STREAM_HEADER_LEN as usize] = 0x00;
        let store = store_from(banks);

        let mut engine = RawPcmEngine::new();
        let ptr = RomPointer::new(0, ptr_offset as u32);
        engine.load_audio_stream(&store, 0, ptr, 0x64).unwrap();
        assert!(matches!(engine.next_sample(&store), Err(DcsError::EngineFault(_))));
    }

    #[test]
    fn test_stream_header_validation() {
        let mut builder = RawRomBuilder::new("SET", 1);
        builder.add_track(None);
        let store = store_from(builder.build());
        let engine = RawPcmEngine::new();

        // Program header bytes are not a stream header
        let result = engine.stream_info(&store, RomPointer::new(0, 0));
        assert!(matches!(result, Err(DcsError::EngineFault(_))));
        let result = engine.stream_info(&store, RomPointer::new(0, 0xFFFF));
        assert!(matches!(result, Err(DcsError::EngineFault(_))));
    }

    #[test]
    fn test_invalid_channel() {
        let mut builder = RawRomBuilder::new("SET", 1);
        let s = builder.add_silence(0, 1);
        builder.add_track(Some(s));
        let store = store_from(builder.build());

        let mut engine = RawPcmEngine::new();
        let ptr = engine.track_stream(&store, 0).unwrap().unwrap();
        assert!(matches!(
            engine.load_audio_stream(&store, CHANNELS, ptr, 0x64),
            Err(DcsError::InvalidChannel(8))
        ));
        assert_eq!(engine.active_channel(), None);
    }

    #[test]
    fn test_gain() {
        assert_eq!(apply_gain(1000, 100, 255), 1000);
        assert_eq!(apply_gain(-1000, 100, 255), -1000);
        assert_eq!(apply_gain(1000, 50, 255), 500);
        assert_eq!(apply_gain(i16::MAX, 200, 255), i16::MAX);
        assert_eq!(apply_gain(i16::MIN, 200, 255), i16::MIN);
        assert_eq!(apply_gain(1000, 100, 0), 0);
    }

    #[test]
    fn test_soft_boot_restores_default_volume() {
        let mut engine = RawPcmEngine::new();
        engine.set_default_volume(128);
        engine.set_master_volume(10);
        engine.soft_boot();
        assert_eq!(engine.master_volume(), 128);
    }
}
