//! ROM Store Domain
//!
//! Owns the byte buffers of every loaded ROM bank, keyed by chip-select.
//! Engines never hold addresses into this memory: they borrow the store for
//! the duration of a single call, so a bank can only be replaced when no
//! engine operation is running.

pub mod romset;

pub use romset::{discover, RomFile};

use crate::{DcsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of address bits available inside one bank
pub const BANK_ADDRESS_BITS: u32 = 24;

/// Largest bank that fits into the per-chip address window (16 MiB)
pub const MAX_BANK_SIZE: usize = 1 << BANK_ADDRESS_BITS;

const OFFSET_MASK: u32 = (1 << BANK_ADDRESS_BITS) - 1;

/// What `load_bank` does when the chip-select is already occupied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateBankPolicy {
    /// Drop the old bank and keep the new data
    #[default]
    Replace,
    /// Fail with [`DcsError::DuplicateBank`] and keep the old bank
    Reject,
}

/// Validated location of a byte inside a loaded bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RomPointer {
    /// Chip-select of the bank
    pub chip_select: u8,
    /// Byte offset inside the bank
    pub offset: u32,
}

impl RomPointer {
    /// Create a pointer without validating it against a store
    pub fn new(chip_select: u8, offset: u32) -> Self {
        RomPointer {
            chip_select,
            offset,
        }
    }

    /// Linear address form: chip-select in the top byte, offset below it
    pub fn linear(&self) -> u32 {
        ((self.chip_select as u32) << BANK_ADDRESS_BITS) | (self.offset & OFFSET_MASK)
    }

    /// Pointer advanced by `delta` bytes within the same bank
    pub fn add(&self, delta: u32) -> Self {
        RomPointer {
            chip_select: self.chip_select,
            offset: self.offset.saturating_add(delta),
        }
    }
}

impl fmt::Display for RomPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cs{}:{:06x}", self.chip_select, self.offset)
    }
}

/// One loaded ROM image
#[derive(Debug, Clone)]
pub struct RomBank {
    chip_select: u8,
    data: Box<[u8]>,
}

impl RomBank {
    /// Chip-select this bank is registered under
    pub fn chip_select(&self) -> u8 {
        self.chip_select
    }

    /// Bank contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bank size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a zero-length bank
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Owner of all loaded ROM banks
#[derive(Debug, Default)]
pub struct RomStore {
    banks: BTreeMap<u8, RomBank>,
    policy: DuplicateBankPolicy,
}

impl RomStore {
    /// Create an empty store with the default duplicate policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with an explicit duplicate policy
    pub fn with_policy(policy: DuplicateBankPolicy) -> Self {
        RomStore {
            banks: BTreeMap::new(),
            policy,
        }
    }

    /// Current duplicate-load policy
    pub fn policy(&self) -> DuplicateBankPolicy {
        self.policy
    }

    /// Change the duplicate-load policy for subsequent loads
    pub fn set_policy(&mut self, policy: DuplicateBankPolicy) {
        self.policy = policy;
    }

    /// Copy `bytes` into a new bank registered under `chip_select`
    pub fn load_bank(&mut self, chip_select: u8, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_BANK_SIZE {
            return Err(DcsError::BankTooLarge {
                chip_select,
                len: bytes.len(),
            });
        }

        if self.banks.contains_key(&chip_select) {
            match self.policy {
                DuplicateBankPolicy::Reject => return Err(DcsError::DuplicateBank(chip_select)),
                DuplicateBankPolicy::Replace => {
                    tracing::warn!(chip_select, "replacing previously loaded ROM bank");
                }
            }
        }

        let bank = RomBank {
            chip_select,
            data: bytes.to_vec().into_boxed_slice(),
        };
        self.banks.insert(chip_select, bank);
        tracing::info!(chip_select, len = bytes.len(), "loaded ROM bank");
        Ok(())
    }

    /// Look up the bank for a chip-select
    pub fn bank(&self, chip_select: u8) -> Result<&RomBank> {
        self.banks
            .get(&chip_select)
            .ok_or(DcsError::InvalidBank(chip_select))
    }

    /// True when a bank is loaded under `chip_select`
    pub fn contains(&self, chip_select: u8) -> bool {
        self.banks.contains_key(&chip_select)
    }

    /// Loaded chip-selects in ascending order
    pub fn chip_selects(&self) -> Vec<u8> {
        self.banks.keys().copied().collect()
    }

    /// Number of loaded banks
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    /// True when no bank is loaded
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }

    /// Borrow `len` bytes starting at `pointer`
    ///
    /// Fails with `InvalidBank` for an unknown chip-select and with
    /// `OutOfRangePointer` when the range runs past the end of the bank.
    pub fn read(&self, pointer: RomPointer, len: usize) -> Result<&[u8]> {
        let bank = self.bank(pointer.chip_select)?;
        let start = pointer.offset as usize;
        let end = start.checked_add(len).filter(|&end| end <= bank.len());

        match end {
            Some(end) => Ok(&bank.data[start..end]),
            None => Err(DcsError::OutOfRangePointer {
                address: pointer.linear(),
                reason: format!(
                    "{} bytes at {} exceed bank size {:#x}",
                    len,
                    pointer,
                    bank.len()
                ),
            }),
        }
    }

    /// Borrow everything from `pointer` to the end of its bank
    pub fn tail(&self, pointer: RomPointer) -> Result<&[u8]> {
        let bank = self.bank(pointer.chip_select)?;
        let remaining = bank.len().saturating_sub(pointer.offset as usize);
        self.read(pointer, remaining)
    }

    /// Turn a linear address into a pointer into a loaded bank
    ///
    /// The chip-select comes from the top address byte. Addresses whose bank
    /// is not loaded, or whose offset lies past the end of the bank, are
    /// rejected with `OutOfRangePointer`.
    pub fn resolve_linear(&self, address: u32) -> Result<RomPointer> {
        let pointer = RomPointer::new((address >> BANK_ADDRESS_BITS) as u8, address & OFFSET_MASK);

        let bank = self
            .banks
            .get(&pointer.chip_select)
            .ok_or_else(|| DcsError::OutOfRangePointer {
                address,
                reason: format!("no bank loaded for chip-select {}", pointer.chip_select),
            })?;

        if pointer.offset as usize >= bank.len() {
            return Err(DcsError::OutOfRangePointer {
                address,
                reason: format!(
                    "offset {:#x} past end of bank {} ({:#x} bytes)",
                    pointer.offset,
                    pointer.chip_select,
                    bank.len()
                ),
            });
        }

        Ok(pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_copies_data() {
        let mut store = RomStore::new();
        let mut source = vec![1u8, 2, 3, 4];
        store.load_bank(2, &source).unwrap();
        source[0] = 0xFF;

        assert_eq!(store.bank(2).unwrap().data(), &[1, 2, 3, 4]);
        assert_eq!(store.chip_selects(), vec![2]);
    }

    #[test]
    fn test_unknown_bank() {
        let store = RomStore::new();
        assert!(matches!(store.bank(3), Err(DcsError::InvalidBank(3))));
        assert!(matches!(
            store.read(RomPointer::new(3, 0), 1),
            Err(DcsError::InvalidBank(3))
        ));
    }

    #[test]
    fn test_duplicate_replace() {
        let mut store = RomStore::new();
        store.load_bank(0, &[1, 1]).unwrap();
        store.load_bank(0, &[2, 2, 2]).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.bank(0).unwrap().data(), &[2, 2, 2]);
    }

    #[test]
    fn test_duplicate_reject_keeps_old_bank() {
        let mut store = RomStore::with_policy(DuplicateBankPolicy::Reject);
        store.load_bank(1, &[7]).unwrap();
        let result = store.load_bank(1, &[9]);
        assert!(matches!(result, Err(DcsError::DuplicateBank(1))));
        assert_eq!(store.bank(1).unwrap().data(), &[7]);
    }

    #[test]
    fn test_read_bounds() {
        let mut store = RomStore::new();
        store.load_bank(0, &[10, 11, 12, 13]).unwrap();

        assert_eq!(store.read(RomPointer::new(0, 1), 3).unwrap(), &[11, 12, 13]);
        assert!(matches!(
            store.read(RomPointer::new(0, 2), 3),
            Err(DcsError::OutOfRangePointer { .. })
        ));
        assert_eq!(store.tail(RomPointer::new(0, 3)).unwrap(), &[13]);
    }

    #[test]
    fn test_resolve_linear() {
        let mut store = RomStore::new();
        store.load_bank(0, &[0u8; 16]).unwrap();
        store.load_bank(3, &[0u8; 32]).unwrap();

        assert_eq!(store.resolve_linear(0x0000_000F).unwrap(), RomPointer::new(0, 0x0F));
        assert_eq!(store.resolve_linear(0x0300_0010).unwrap(), RomPointer::new(3, 0x10));
        assert!(matches!(
            store.resolve_linear(0x0000_0010),
            Err(DcsError::OutOfRangePointer { address: 0x10, .. })
        ));
        assert!(matches!(
            store.resolve_linear(0x0100_0000),
            Err(DcsError::OutOfRangePointer { .. })
        ));
    }

    #[test]
    fn test_pointer_linear_round_trip() {
        let ptr = RomPointer::new(5, 0x01_2345);
        assert_eq!(ptr.linear(), 0x0501_2345);
        assert_eq!(ptr.add(2).offset, 0x01_2347);
        assert_eq!(ptr.to_string(), "cs5:012345");
    }
}
