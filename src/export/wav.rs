//! WAV container packaging
//!
//! Produces the fixed 44-byte RIFF/WAVE header for 16-bit mono PCM at the
//! decoder's output rate. The two size fields depend on the payload length,
//! so the header is written as a template first and patched once the stream
//! size is known.

use crate::engine::{BYTES_PER_SAMPLE, SAMPLE_RATE};
use crate::{DcsError, Result};
use std::path::Path;

/// Size of the container header
pub const WAV_HEADER_LEN: usize = 44;

/// Offset of the RIFF size field (file length minus 8)
const RIFF_SIZE_OFFSET: usize = 4;

/// Offset of the data chunk size field
const DATA_SIZE_OFFSET: usize = 40;

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const FMT_CHUNK_SIZE: u32 = 16;
const FORMAT_PCM: u16 = 1;

/// Header template with both size fields zeroed
pub fn placeholder_header() -> [u8; WAV_HEADER_LEN] {
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = SAMPLE_RATE * block_align as u32;

    let mut header = Vec::with_capacity(WAV_HEADER_LEN);

    // RIFF header
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&0u32.to_le_bytes()); // patched: file size - 8
    header.extend_from_slice(b"WAVE");

    // fmt chunk
    header.extend_from_slice(b"fmt ");
    header.extend_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    header.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    header.extend_from_slice(&CHANNELS.to_le_bytes());
    header.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    header.extend_from_slice(&byte_rate.to_le_bytes());
    header.extend_from_slice(&block_align.to_le_bytes());
    header.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data chunk
    header.extend_from_slice(b"data");
    header.extend_from_slice(&0u32.to_le_bytes()); // patched: payload size

    let mut out = [0u8; WAV_HEADER_LEN];
    out.copy_from_slice(&header);
    out
}

/// Write the two size fields of a header already present in `buf`
pub fn patch_lengths(buf: &mut [u8], stream_bytes: u32) -> Result<()> {
    if buf.len() < WAV_HEADER_LEN {
        return Err(DcsError::Other(format!(
            "container buffer holds {} bytes, header needs {}",
            buf.len(),
            WAV_HEADER_LEN
        )));
    }
    let riff_size = stream_bytes
        .checked_add((WAV_HEADER_LEN - 8) as u32)
        .ok_or_else(|| DcsError::Other(format!("stream of {} bytes overflows RIFF size", stream_bytes)))?;

    buf[RIFF_SIZE_OFFSET..RIFF_SIZE_OFFSET + 4].copy_from_slice(&riff_size.to_le_bytes());
    buf[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4].copy_from_slice(&stream_bytes.to_le_bytes());
    Ok(())
}

/// Complete header for a payload of `total_stream_bytes`
pub fn build_header(total_stream_bytes: u32) -> Result<[u8; WAV_HEADER_LEN]> {
    let mut header = placeholder_header();
    patch_lengths(&mut header, total_stream_bytes)?;
    Ok(header)
}

/// A finished WAV container: header followed by little-endian samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    bytes: Vec<u8>,
}

impl AudioBuffer {
    /// Start a container for `stream_bytes` of payload
    ///
    /// The buffer is preallocated for the whole container and the header is
    /// written with its final sizes; samples are appended afterwards.
    pub fn for_stream(stream_bytes: u32) -> Result<Self> {
        let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + stream_bytes as usize);
        bytes.extend_from_slice(&placeholder_header());
        patch_lengths(&mut bytes, stream_bytes)?;
        Ok(AudioBuffer { bytes })
    }

    /// Append one sample as its two's-complement little-endian bytes
    pub fn push_sample(&mut self, sample: i16) {
        self.bytes.extend_from_slice(&sample.to_le_bytes());
    }

    /// Size written into the data chunk header
    pub fn declared_data_len(&self) -> u32 {
        let field = &self.bytes[DATA_SIZE_OFFSET..DATA_SIZE_OFFSET + 4];
        u32::from_le_bytes([field[0], field[1], field[2], field[3]])
    }

    /// Payload bytes appended so far
    pub fn data_len(&self) -> usize {
        self.bytes.len() - WAV_HEADER_LEN
    }

    /// True once the payload matches the declared size
    pub fn is_complete(&self) -> bool {
        self.data_len() == self.declared_data_len() as usize
    }

    /// The 44 header bytes
    pub fn header(&self) -> &[u8] {
        &self.bytes[..WAV_HEADER_LEN]
    }

    /// Raw little-endian sample bytes
    pub fn samples(&self) -> &[u8] {
        &self.bytes[WAV_HEADER_LEN..]
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        (self.data_len() / BYTES_PER_SAMPLE as usize) as f64 / SAMPLE_RATE as f64
    }

    /// The whole container
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total container size
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Never true; a container always carries its header
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Take ownership of the container bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Write the container to a file
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), &self.bytes)?;
        Ok(())
    }
}

impl AsRef<[u8]> for AudioBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn test_header_layout() {
        let header = build_header(480).unwrap();
        let expected: [u8; 44] = [
            b'R', b'I', b'F', b'F', 0x04, 0x02, 0, 0, // 480 + 36
            b'W', b'A', b'V', b'E', b'f', b'm', b't', b' ', //
            16, 0, 0, 0, 1, 0, 1, 0, //
            0x12, 0x7a, 0, 0, // 31250 Hz
            0x24, 0xf4, 0, 0, // 62500 bytes/s
            2, 0, 16, 0, //
            b'd', b'a', b't', b'a', 0xe0, 0x01, 0, 0,
        ];
        assert_eq!(header, expected);
    }

    #[test]
    fn test_placeholder_has_zero_sizes() {
        let header = placeholder_header();
        assert_eq!(le32(&header, 4), 0);
        assert_eq!(le32(&header, 40), 0);
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn test_patch_overflow() {
        let mut header = placeholder_header();
        assert!(patch_lengths(&mut header, u32::MAX).is_err());
        assert!(patch_lengths(&mut header[..40], 2).is_err());
    }

    #[test]
    fn test_negative_samples_split() {
        let mut buffer = AudioBuffer::for_stream(6).unwrap();
        buffer.push_sample(-1);
        buffer.push_sample(i16::MIN);
        buffer.push_sample(0x1234);

        assert_eq!(buffer.samples(), &[0xFF, 0xFF, 0x00, 0x80, 0x34, 0x12]);
        assert!(buffer.is_complete());
        assert_eq!(buffer.len(), 50);
        assert_eq!(le32(buffer.as_bytes(), 4), 50 - 8);
    }

    #[test]
    fn test_incomplete_buffer() {
        let mut buffer = AudioBuffer::for_stream(4).unwrap();
        buffer.push_sample(1);
        assert!(!buffer.is_complete());
        assert_eq!(buffer.declared_data_len(), 4);
    }
}
