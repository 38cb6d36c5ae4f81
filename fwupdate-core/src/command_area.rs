//! A monotonic, crash-safe state log for firmware install operations.
//!
//! Grounded in `fragmentstore/command.c`: three fixed sub-regions (install
//! command, history, state words) inside one flash area, mutated only by
//! appending magic words so a crash mid-write leaves either the old value or
//! the new one, never something in between.

use crate::codec::{Metadata, METADATA_SIZE};
use crate::crc32::crc32;
use crate::error::CoreError;
use crate::traits::{FlashDevice, MemoryConfig};

const STATE_SLOT_COUNT: usize = 8;
const STATE_SLOT_SIZE: usize = 4;
const STATE_MEMORY_SIZE: usize = STATE_SLOT_COUNT * STATE_SLOT_SIZE;

const INSTALL_MEMORY_SIZE: usize = 4 + METADATA_SIZE + 4;
const HISTORY_MEMORY_SIZE: usize = METADATA_SIZE + 4;

const MAGIC_HISTORY_WRITTEN: u32 = 0xA1A1_A1A1;
const MAGIC_FIRMWARE_WRITTEN: u32 = 0xB2B2_B2B2;
const MAGIC_FAILED: u32 = 0xEEEE_EEEE;

const COMMAND_INSTALL_FIRMWARE: u32 = 0xA5A5;
const COMMAND_ROLLBACK: u32 = 0xD17D;

/// A command pending in the install region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Install region is empty: no command pending.
    None,
    InstallFirmware,
    Rollback,
    /// Install region holds a word that matches neither known command.
    Error,
}

impl CommandType {
    fn to_word(self) -> u32 {
        match self {
            CommandType::None => 0x0000,
            CommandType::InstallFirmware => COMMAND_INSTALL_FIRMWARE,
            CommandType::Rollback => COMMAND_ROLLBACK,
            CommandType::Error => 0x0001,
        }
    }

    fn from_word(word: u32) -> Self {
        match word {
            COMMAND_INSTALL_FIRMWARE => CommandType::InstallFirmware,
            COMMAND_ROLLBACK => CommandType::Rollback,
            _ => CommandType::Error,
        }
    }
}

/// The highest-priority status recorded in the state region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    None,
    HistoryWritten,
    FirmwareWritten,
    Failed,
}

impl Status {
    fn magic(self) -> Option<u32> {
        match self {
            Status::None => None,
            Status::HistoryWritten => Some(MAGIC_HISTORY_WRITTEN),
            Status::FirmwareWritten => Some(MAGIC_FIRMWARE_WRITTEN),
            Status::Failed => Some(MAGIC_FAILED),
        }
    }
}

/// One decoded state slot: empty, a reserved status magic, or an
/// application-defined token. Replaces matching raw `u32` magic words at
/// every call site with a single exhaustive type, per the source's
/// `StateMemory_t.states[8]` array of bare words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateSlot {
    Erased,
    Reserved(Status),
    User(u32),
}

impl StateSlot {
    fn decode(word: u32, bytes: &[u8], erase_value: u8) -> Self {
        if bytes.iter().all(|&b| b == erase_value) {
            return StateSlot::Erased;
        }
        match word {
            MAGIC_HISTORY_WRITTEN => StateSlot::Reserved(Status::HistoryWritten),
            MAGIC_FIRMWARE_WRITTEN => StateSlot::Reserved(Status::FirmwareWritten),
            MAGIC_FAILED => StateSlot::Reserved(Status::Failed),
            other => StateSlot::User(other),
        }
    }
}

/// A flash-resident install/history/state log, generic over the injected
/// [`FlashDevice`]. CRC32 is fixed to [`crate::crc32::crc32`] rather than
/// injected — the source threads a `Crc32_t` function pointer through
/// `CA_InitStruct`, but this crate has exactly one CRC32 implementation, so
/// the indirection added nothing and is dropped here.
pub struct CommandArea<'a, D> {
    flash: &'a D,
    config: MemoryConfig,
    install_address: u32,
    history_address: u32,
    state_address: u32,
}

fn required_sectors(sector_size: usize, size: usize) -> usize {
    (sector_size + size - 1) / sector_size
}

fn is_empty(bytes: &[u8], erase_value: u8) -> bool {
    bytes.iter().all(|&b| b == erase_value)
}

impl<'a, D> CommandArea<'a, D>
where
    D: FlashDevice,
{
    /// Computes offsets for the install, history, and state sub-regions.
    /// `Param` under the same config checks as [`crate::fragment_area`].
    pub fn init(flash: &'a D, config: MemoryConfig) -> Result<Self, CoreError> {
        if config.memory_size == 0 || config.sector_size == 0 {
            return Err(CoreError::Param);
        }
        if config.memory_size % config.sector_size != 0 {
            return Err(CoreError::Param);
        }

        let install_sectors = required_sectors(config.sector_size, INSTALL_MEMORY_SIZE);
        let history_sectors = required_sectors(config.sector_size, HISTORY_MEMORY_SIZE);
        let state_sectors = required_sectors(config.sector_size, STATE_MEMORY_SIZE);

        let install_address = config.base_address;
        let history_address = install_address
            .checked_add((install_sectors * config.sector_size) as u32)
            .ok_or(CoreError::Param)?;
        let state_address = history_address
            .checked_add((history_sectors * config.sector_size) as u32)
            .ok_or(CoreError::Param)?;
        let end = state_address
            .checked_add((state_sectors * config.sector_size) as u32)
            .ok_or(CoreError::Param)?;

        if end > config.base_address + config.memory_size as u32 {
            return Err(CoreError::Param);
        }

        Ok(Self {
            flash,
            config,
            install_address,
            history_address,
            state_address,
        })
    }

    fn read_state_slot(&self, slot: usize) -> Result<StateSlot, CoreError> {
        let address = self.state_address + (slot * STATE_SLOT_SIZE) as u32;
        let mut bytes = [0u8; STATE_SLOT_SIZE];
        self.flash.read(address, &mut bytes)?;
        let word = u32::from_le_bytes(bytes);
        Ok(StateSlot::decode(word, &bytes, self.config.erase_value))
    }

    /// Highest-priority status across the eight state slots: `Failed` >
    /// `FirmwareWritten` > `HistoryWritten` > `None`. A flash read failure
    /// folds into `Failed` rather than propagating — fail-closed, matching
    /// the source's `CA_GetStatus`.
    pub fn get_status(&self) -> Status {
        let mut seen_history = false;
        let mut seen_firmware = false;

        for slot in 0..STATE_SLOT_COUNT {
            match self.read_state_slot(slot) {
                Err(_) => return Status::Failed,
                Ok(StateSlot::Reserved(Status::Failed)) => return Status::Failed,
                Ok(StateSlot::Reserved(Status::FirmwareWritten)) => seen_firmware = true,
                Ok(StateSlot::Reserved(Status::HistoryWritten)) => seen_history = true,
                Ok(_) => {}
            }
        }

        if seen_firmware {
            Status::FirmwareWritten
        } else if seen_history {
            Status::HistoryWritten
        } else {
            Status::None
        }
    }

    fn first_empty_slot(&self) -> Result<Option<usize>, CoreError> {
        for slot in 0..STATE_SLOT_COUNT {
            if matches!(self.read_state_slot(slot)?, StateSlot::Erased) {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    fn append_word(&self, word: u32) -> Result<(), CoreError> {
        for slot in 0..STATE_SLOT_COUNT {
            let mut bytes = [0u8; STATE_SLOT_SIZE];
            self.flash
                .read(self.state_address + (slot * STATE_SLOT_SIZE) as u32, &mut bytes)?;
            if !is_empty(&bytes, self.config.erase_value) && u32::from_le_bytes(bytes) == word {
                return Ok(());
            }
        }

        let slot = self.first_empty_slot()?.ok_or(CoreError::Busy)?;
        let address = self.state_address + (slot * STATE_SLOT_SIZE) as u32;
        self.flash.write(address, &word.to_le_bytes())
    }

    /// Idempotent append: if `status`'s magic is already present, this is a
    /// no-op. Otherwise writes it into the first all-erased slot. `Param` for
    /// `Status::None` (it has no magic to append). `Busy` if the region is
    /// full or the flash write fails.
    pub fn set_status(&self, status: Status) -> Result<(), CoreError> {
        let magic = status.magic().ok_or(CoreError::Param)?;
        self.append_word(magic)
    }

    /// Writes an application-defined token into the state region, subject to
    /// the same idempotent-append rule as [`Self::set_status`]. `Param` if
    /// `word` collides with one of the three reserved magics.
    pub fn set_user_status(&self, word: u32) -> Result<(), CoreError> {
        if word == MAGIC_HISTORY_WRITTEN || word == MAGIC_FIRMWARE_WRITTEN || word == MAGIC_FAILED
        {
            return Err(CoreError::Param);
        }
        self.append_word(word)
    }

    /// Returns the first user-defined token found across the state slots, if
    /// any, ignoring reserved/erased slots.
    pub fn get_user_status(&self) -> Result<Option<u32>, CoreError> {
        for slot in 0..STATE_SLOT_COUNT {
            if let StateSlot::User(word) = self.read_state_slot(slot)? {
                return Ok(Some(word));
            }
        }
        Ok(None)
    }

    fn erase_install_region(&self) -> Result<(), CoreError> {
        let size = required_sectors(self.config.sector_size, INSTALL_MEMORY_SIZE)
            * self.config.sector_size;
        self.flash.erase(self.install_address, size)
    }

    fn erase_state_region(&self) -> Result<(), CoreError> {
        let size =
            required_sectors(self.config.sector_size, STATE_MEMORY_SIZE) * self.config.sector_size;
        self.flash.erase(self.state_address, size)
    }

    /// Erases the install region and the state region, then writes
    /// `{cmd_type as u32, metadata, crc32}`. Erasing state resets the install
    /// lifecycle, so a fresh command always starts from `Status::None`.
    pub fn write_install_command(
        &self,
        cmd_type: CommandType,
        metadata: &Metadata,
    ) -> Result<(), CoreError> {
        self.erase_install_region()?;
        self.erase_state_region()?;

        let mut buf = [0u8; INSTALL_MEMORY_SIZE];
        buf[0..4].copy_from_slice(&cmd_type.to_word().to_le_bytes());
        buf[4..4 + METADATA_SIZE].copy_from_slice(&metadata.encode());
        let crc = crc32(&buf[0..4 + METADATA_SIZE]);
        buf[4 + METADATA_SIZE..INSTALL_MEMORY_SIZE].copy_from_slice(&crc.to_le_bytes());

        self.flash.write(self.install_address, &buf)
    }

    /// Erases only the install region; history is preserved.
    pub fn erase_install_command(&self) -> Result<(), CoreError> {
        self.erase_install_region()
    }

    /// Reads and CRC-verifies the install region. If the command word is
    /// empty (all `erase_value`), returns `CommandType::None` without
    /// checking the CRC — the region has simply never been written, and its
    /// CRC field would legitimately mismatch an empty record. Otherwise a CRC
    /// mismatch is `Invalid`. Metadata is always returned as decoded,
    /// regardless of whether it passes its own validator: that judgement
    /// belongs to whatever layer consumes it.
    pub fn read_install_command(&self) -> Result<(CommandType, Metadata), CoreError> {
        let mut buf = [0u8; INSTALL_MEMORY_SIZE];
        self.flash.read(self.install_address, &mut buf)?;

        let command_bytes = &buf[0..4];
        let metadata_bytes: &[u8; METADATA_SIZE] =
            buf[4..4 + METADATA_SIZE].try_into().unwrap();
        let metadata = Metadata::decode_unchecked(metadata_bytes);

        if is_empty(command_bytes, self.config.erase_value) {
            return Ok((CommandType::None, metadata));
        }

        let stored_crc = u32::from_le_bytes(
            buf[4 + METADATA_SIZE..INSTALL_MEMORY_SIZE].try_into().unwrap(),
        );
        let computed_crc = crc32(&buf[0..4 + METADATA_SIZE]);
        if stored_crc != computed_crc {
            return Err(CoreError::Invalid);
        }

        let command_word = u32::from_le_bytes(command_bytes.try_into().unwrap());
        Ok((CommandType::from_word(command_word), metadata))
    }

    /// Erases the history region, then writes `{metadata, crc32}`.
    pub fn write_history(&self, metadata: &Metadata) -> Result<(), CoreError> {
        let size = required_sectors(self.config.sector_size, HISTORY_MEMORY_SIZE)
            * self.config.sector_size;
        self.flash.erase(self.history_address, size)?;

        let mut buf = [0u8; HISTORY_MEMORY_SIZE];
        buf[0..METADATA_SIZE].copy_from_slice(&metadata.encode());
        let crc = crc32(&buf[0..METADATA_SIZE]);
        buf[METADATA_SIZE..HISTORY_MEMORY_SIZE].copy_from_slice(&crc.to_le_bytes());

        self.flash.write(self.history_address, &buf)
    }

    /// Reads and CRC-verifies the history region. `Invalid` on mismatch —
    /// unlike the install region, an empty history has no "never written"
    /// exception, since there is no command word to distinguish it by; a
    /// fresh region's all-erased CRC field will not match the CRC of an
    /// all-erased metadata block either, and callers are expected to only
    /// read history after `write_history` has run at least once.
    pub fn read_history(&self) -> Result<Metadata, CoreError> {
        let mut buf = [0u8; HISTORY_MEMORY_SIZE];
        self.flash.read(self.history_address, &mut buf)?;

        let metadata_bytes: &[u8; METADATA_SIZE] = buf[0..METADATA_SIZE].try_into().unwrap();
        let stored_crc =
            u32::from_le_bytes(buf[METADATA_SIZE..HISTORY_MEMORY_SIZE].try_into().unwrap());
        let computed_crc = crc32(&buf[0..METADATA_SIZE]);
        if stored_crc != computed_crc {
            return Err(CoreError::Invalid);
        }

        Ok(Metadata::decode_unchecked(metadata_bytes))
    }
}
