//! Storage of one metadata header and a sequence of fixed-size signed
//! fragments in a contiguous flash region, with `O(log N)` discovery of the
//! last occupied slot.
//!
//! Grounded in `fragmentstore/fragmentstore.c`: this module keeps that
//! file's structure (one op per public function, same guard order) while
//! replacing the `MemoryConfig_t` function pointers with the
//! [`crate::traits::FlashDevice`]/validator capability traits.

use crate::codec::{Fragment, Metadata, FRAGMENT_SIZE, METADATA_SIZE};
use crate::error::{CoreError, ReadOutcome, SearchOutcome};
use crate::traits::{FlashDevice, FragmentValidator, MemoryConfig, MetadataValidator};

/// One flash region holding a metadata header followed by `N` fragment
/// slots. `D`/`FV`/`MV` are the injected flash device and per-record
/// validators, held by borrow/value rather than behind a vtable.
pub struct FragmentArea<'a, D, FV, MV> {
    flash: &'a D,
    config: MemoryConfig,
    metadata_sectors: usize,
    fragment_sectors: usize,
    validate_fragment: FV,
    validate_metadata: MV,
}

fn required_sectors(sector_size: usize, size: usize) -> usize {
    (sector_size + size - 1) / sector_size
}

fn is_empty(bytes: &[u8], erase_value: u8) -> bool {
    bytes.iter().all(|&b| b == erase_value)
}

impl<'a, D, FV, MV> FragmentArea<'a, D, FV, MV>
where
    D: FlashDevice,
    FV: FragmentValidator,
    MV: MetadataValidator,
{
    /// Computes sector counts for the metadata and fragment sub-regions.
    /// `Param` if `memory_size`/`sector_size` is zero, or `memory_size` is
    /// not a multiple of `sector_size`.
    pub fn init(
        flash: &'a D,
        config: MemoryConfig,
        validate_fragment: FV,
        validate_metadata: MV,
    ) -> Result<Self, CoreError> {
        if config.memory_size == 0 || config.sector_size == 0 {
            return Err(CoreError::Param);
        }
        if config.memory_size % config.sector_size != 0 {
            return Err(CoreError::Param);
        }

        let metadata_sectors = required_sectors(config.sector_size, METADATA_SIZE);
        let fragment_sectors = required_sectors(config.sector_size, FRAGMENT_SIZE);

        Ok(Self {
            flash,
            config,
            metadata_sectors,
            fragment_sectors,
            validate_fragment,
            validate_metadata,
        })
    }

    /// Highest index `read_fragment`/`write_fragment` will accept, derived
    /// purely from `config` and the two sector counts.
    pub fn max_fragment_index(&self) -> usize {
        let total_sectors = self.config.memory_size / self.config.sector_size;
        let total_fragment_sectors = total_sectors - self.metadata_sectors;
        total_fragment_sectors / self.fragment_sectors
    }

    /// Erases the entire region with one eraser call spanning `memory_size`.
    pub fn erase_area(&self) -> Result<(), CoreError> {
        self.flash
            .erase(self.config.base_address, self.config.memory_size)
    }

    fn fragment_address(&self, index: usize) -> Option<u32> {
        let sector_index = self.metadata_sectors.checked_add(
            index.checked_mul(self.fragment_sectors)?,
        )?;
        let offset = sector_index.checked_mul(self.config.sector_size)?;
        let offset: u32 = u32::try_from(offset).ok()?;
        self.config.base_address.checked_add(offset)
    }

    fn check_address(&self, address: u32, size: usize) -> Result<(), CoreError> {
        let start = self.config.base_address;
        let end = start
            .checked_add(self.config.memory_size as u32)
            .ok_or(CoreError::Param)?;
        let size: u32 = u32::try_from(size).map_err(|_| CoreError::Param)?;
        let address_end = address.checked_add(size).ok_or(CoreError::Param)?;

        if address < start || address >= end || address_end > end {
            return Err(CoreError::Param);
        }
        Ok(())
    }

    fn fragment_slot_address(&self, index: usize) -> Result<u32, CoreError> {
        let address = self.fragment_address(index).ok_or(CoreError::Param)?;
        self.check_address(address, FRAGMENT_SIZE)?;
        Ok(address)
    }

    /// Reads `sizeof(metadata)` bytes at the area's base address.
    pub fn read_metadata(&self) -> Result<Metadata, ReadOutcome> {
        let mut buf = [0u8; METADATA_SIZE];
        self.flash
            .read(self.config.base_address, &mut buf)
            .map_err(ReadOutcome::Error)?;

        if is_empty(&buf, self.config.erase_value) {
            return Err(ReadOutcome::Empty);
        }

        let metadata =
            Metadata::decode(&buf).map_err(|_| ReadOutcome::Error(CoreError::Invalid))?;
        if !self.validate_metadata.validate(&metadata) {
            return Err(ReadOutcome::Error(CoreError::Invalid));
        }
        Ok(metadata)
    }

    fn read_fragment_at(&self, address: u32) -> Result<([u8; FRAGMENT_SIZE], bool), CoreError> {
        let mut buf = [0u8; FRAGMENT_SIZE];
        self.flash.read(address, &mut buf)?;
        let empty = is_empty(&buf, self.config.erase_value);
        Ok((buf, empty))
    }

    /// Reads and validates the fragment at `index`.
    pub fn read_fragment(&self, index: usize) -> Result<Fragment, ReadOutcome> {
        let address = self.fragment_slot_address(index).map_err(ReadOutcome::Error)?;
        let (buf, empty) = self.read_fragment_at(address).map_err(ReadOutcome::Error)?;
        if empty {
            return Err(ReadOutcome::Empty);
        }

        let fragment =
            Fragment::decode(&buf).map_err(|_| ReadOutcome::Error(CoreError::Invalid))?;
        if !self.validate_fragment.validate(&fragment) {
            return Err(ReadOutcome::Error(CoreError::Invalid));
        }
        Ok(fragment)
    }

    /// Reads the fragment at `index` regardless of whether it passes
    /// validation. Only `Empty`/`Busy` are distinguished; a fragment that
    /// would be `Invalid` under [`Self::read_fragment`] is still returned.
    /// Diagnostic/recovery use only — never call this from a
    /// correctness-relevant path.
    pub fn read_fragment_force(&self, index: usize) -> Result<Fragment, ReadOutcome> {
        let address = self.fragment_slot_address(index).map_err(ReadOutcome::Error)?;
        let (buf, empty) = self.read_fragment_at(address).map_err(ReadOutcome::Error)?;
        if empty {
            return Err(ReadOutcome::Empty);
        }
        Fragment::decode(&buf).map_err(|_| ReadOutcome::Error(CoreError::Invalid))
    }

    /// Erases the metadata sub-region, then writes `metadata`. `Invalid` if
    /// the validator rejects it before anything is erased.
    pub fn write_metadata(&self, metadata: &Metadata) -> Result<(), CoreError> {
        if !self.validate_metadata.validate(metadata) {
            return Err(CoreError::Invalid);
        }

        let erase_size = self.metadata_sectors * self.config.sector_size;
        self.flash.erase(self.config.base_address, erase_size)?;
        self.flash
            .write(self.config.base_address, &metadata.encode())
    }

    /// Writes `fragment` at `index`. Does **not** erase: the slot must have
    /// been erased beforehand, either by [`Self::erase_area`] or
    /// [`Self::erase_fragment_slot`].
    pub fn write_fragment(&self, index: usize, fragment: &Fragment) -> Result<(), CoreError> {
        let address = self.fragment_slot_address(index)?;
        if !self.validate_fragment.validate(fragment) {
            return Err(CoreError::Invalid);
        }
        self.flash.write(address, &fragment.encode())
    }

    /// Erases exactly one fragment slot's sectors.
    pub fn erase_fragment_slot(&self, index: usize) -> Result<(), CoreError> {
        let address = self.fragment_slot_address(index)?;
        let erase_size = self.fragment_sectors * self.config.sector_size;
        self.flash.erase(address, erase_size)
    }

    fn probe(&self, index: usize) -> Result<ProbeResult, CoreError> {
        let address = self.fragment_slot_address(index)?;
        let (buf, empty) = self.read_fragment_at(address)?;
        if empty {
            return Ok(ProbeResult::Empty);
        }
        match Fragment::decode(&buf) {
            Ok(fragment) if self.validate_fragment.validate(&fragment) => {
                Ok(ProbeResult::Valid)
            }
            _ => Ok(ProbeResult::Invalid),
        }
    }

    /// Binary search across `[0, max_fragment_index]` for the largest index
    /// whose slot is non-empty and valid. Stops and reports the index of the
    /// first invalid slot it encounters, rather than treating corruption as
    /// absence.
    pub fn find_last_fragment(&self) -> Result<SearchOutcome, CoreError> {
        let max_index = self.max_fragment_index();
        let mut left = 0usize;
        let mut right = max_index;
        let mut found: Option<usize> = None;

        while left <= right {
            let middle = left + (right - left) / 2;
            match self.probe(middle)? {
                ProbeResult::Empty => {
                    if middle == 0 {
                        return Ok(SearchOutcome::Empty);
                    }
                    right = middle - 1;
                }
                ProbeResult::Invalid => return Ok(SearchOutcome::Invalid(middle)),
                ProbeResult::Valid => {
                    found = Some(middle);
                    if middle == max_index {
                        break;
                    }
                    left = middle + 1;
                }
            }
        }

        Ok(found.map(SearchOutcome::Found).unwrap_or(SearchOutcome::Empty))
    }

    /// Same contract as [`Self::find_last_fragment`], scanning ascending
    /// from `0` until the first empty or invalid slot.
    pub fn find_last_fragment_linear(&self) -> Result<SearchOutcome, CoreError> {
        let mut last_valid: Option<usize> = None;

        for index in 0..=self.max_fragment_index() {
            match self.probe(index)? {
                ProbeResult::Empty => break,
                ProbeResult::Invalid => return Ok(SearchOutcome::Invalid(index)),
                ProbeResult::Valid => last_valid = Some(index),
            }
        }

        Ok(last_valid.map(SearchOutcome::Found).unwrap_or(SearchOutcome::Empty))
    }
}

enum ProbeResult {
    Empty,
    Invalid,
    Valid,
}
