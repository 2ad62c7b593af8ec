//! ROM Set Discovery
//!
//! Finds sound ROM dumps in a directory and maps each file to the chip-select
//! encoded in its name. Recognized names (case-insensitive):
//! - `<anything>.u<N>` (e.g. `sound.u2`)
//! - `<anything>u<N>.rom` (e.g. `snd_u3.rom`)
//! - `<anything>su<N>.l1` (e.g. `mm_su4.l1`)

use crate::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A ROM dump on disk and the chip-select it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomFile {
    /// File location
    pub path: PathBuf,
    /// Chip-select parsed from the file name
    pub chip_select: u8,
}

/// Extract the chip-select digit from a ROM file name
pub fn chip_select_from_name(name: &str) -> Option<u8> {
    let lower = name.to_ascii_lowercase();

    if let Some(stem) = lower.strip_suffix(".rom") {
        return trailing_digit_after(stem, "u");
    }
    if let Some(stem) = lower.strip_suffix(".l1") {
        return trailing_digit_after(stem, "su");
    }

    let (_, ext) = lower.rsplit_once('.')?;
    let digit = ext.strip_prefix('u')?;
    single_digit(digit)
}

/// `stem` must end in `<marker><digit>`
fn trailing_digit_after(stem: &str, marker: &str) -> Option<u8> {
    let (last, _) = stem.char_indices().last()?;
    let (head, digit) = stem.split_at(last);
    if !head.ends_with(marker) {
        return None;
    }
    single_digit(digit)
}

fn single_digit(s: &str) -> Option<u8> {
    match s.as_bytes() {
        [d @ b'0'..=b'9'] => Some(d - b'0'),
        _ => None,
    }
}

/// List the ROM dumps directly inside `dir`, sorted by chip-select
///
/// Subdirectories are not searched. When two files claim the same
/// chip-select both are returned, in file-name order; loading them in that
/// order lets the store's duplicate policy decide the outcome.
pub fn discover<P: AsRef<Path>>(dir: P) -> Result<Vec<RomFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir.as_ref())
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| format!("Failed to scan ROM directory: {}", e))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if let Some(chip_select) = chip_select_from_name(&name) {
            tracing::debug!(file = %name, chip_select, "found ROM dump");
            files.push(RomFile {
                path: entry.into_path(),
                chip_select,
            });
        }
    }

    files.sort_by_key(|f| f.chip_select);
    Ok(files)
}
