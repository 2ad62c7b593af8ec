//! Audio container export
//!
//! Decoded streams leave the crate as RIFF/WAVE byte buffers; see [`wav`].

pub mod wav;

pub use wav::{build_header, patch_lengths, placeholder_header, AudioBuffer, WAV_HEADER_LEN};
