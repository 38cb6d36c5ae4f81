//! An in-memory device simulator: [`FragmentArea`]/[`CommandArea`] backed by
//! a `Vec<u8>` instead of real flash, wired into [`UpdateServer`] the same
//! way a device firmware would.
//!
//! Grounded in `updateclient/testserver.cpp`: a loopback target for the CLI
//! tooling and its own integration tests that speaks the exact same wire
//! protocol a real device does, without any hardware or UDP socket
//! involved. Unlike the original's handler stubs (which mostly just record
//! what they were called with), these forward real reads and writes into a
//! real `FragmentArea`/`CommandArea` pair, so a round trip through this
//! server exercises the same storage-layer invariants a device enforces.

use std::cell::RefCell;

use fwupdate_core::codec::{Fragment, Metadata};
use fwupdate_core::error::{CoreError, ReadOutcome};
use fwupdate_core::installer::verify_fragment_chain;
use fwupdate_core::protocol::{
    DATA_ID_ERASE_SLOT, DATA_ID_FIRMWARE_NAME, DATA_ID_FIRMWARE_ROLLBACK, DATA_ID_FIRMWARE_TYPE,
    DATA_ID_FIRMWARE_UPDATE, DATA_ID_FIRMWARE_VERSION, DATA_ID_RESET,
};
use fwupdate_core::traits::{Crypto, FlashDevice, FragmentValidator, MemoryConfig};
use fwupdate_core::update_server::{PutFragmentHandler, PutMetadataHandler, ReadDataById, WriteDataById};
use fwupdate_core::{
    CommandArea, CommandType, FragmentArea, FragmentSignatureValidator, ProtocolResult,
    SearchOutcome, SignatureMetadataValidator,
};

struct MemFlash {
    data: RefCell<Vec<u8>>,
}

impl MemFlash {
    fn new(size: usize, erase_value: u8) -> Self {
        Self {
            data: RefCell::new(vec![erase_value; size]),
        }
    }
}

impl FlashDevice for MemFlash {
    fn read(&self, address: u32, out: &mut [u8]) -> Result<(), CoreError> {
        let start = address as usize;
        out.copy_from_slice(&self.data.borrow()[start..start + out.len()]);
        Ok(())
    }

    fn write(&self, address: u32, data: &[u8]) -> Result<(), CoreError> {
        let start = address as usize;
        let mut mem = self.data.borrow_mut();
        for (i, &byte) in data.iter().enumerate() {
            mem[start + i] &= byte;
        }
        Ok(())
    }

    fn erase(&self, address: u32, size: usize) -> Result<(), CoreError> {
        let start = address as usize;
        let mut mem = self.data.borrow_mut();
        for b in &mut mem[start..start + size] {
            *b = 0xFF;
        }
        Ok(())
    }
}

/// Stands in for the fragment validator on the metadata-only read in
/// [`InMemoryServer::current_metadata`], which never touches a fragment.
struct AcceptAllFragments;
impl FragmentValidator for AcceptAllFragments {
    fn validate(&self, _: &Fragment) -> bool {
        true
    }
}

fn unsigned_metadata() -> Metadata {
    Metadata {
        firmware_type: 0,
        version: 0,
        rollback_number: 0,
        firmware_id: 0,
        start_address: 0,
        firmware_size: 0,
        name: [0; 32],
        firmware_signature: [0; 64],
        metadata_signature: [0; 64],
    }
}

fn core_error_to_protocol_result(err: CoreError) -> ProtocolResult {
    match err {
        CoreError::Param | CoreError::Invalid => ProtocolResult::InvalidRequest,
        CoreError::Busy => ProtocolResult::BusyRepeatRequest,
    }
}

/// An in-memory device: a fragment store, a command log, and the four
/// handler traits [`UpdateServer`](fwupdate_core::UpdateServer) dispatches
/// to, all implemented directly on `&InMemoryServer`.
pub struct InMemoryServer<C> {
    fragment_flash: MemFlash,
    command_flash: MemFlash,
    fragment_config: MemoryConfig,
    command_config: MemoryConfig,
    crypto: C,
    public_key: [u8; 32],
    reset_requested: RefCell<bool>,
}

impl<C: Crypto> InMemoryServer<C> {
    pub fn new(
        fragment_config: MemoryConfig,
        command_config: MemoryConfig,
        crypto: C,
        public_key: [u8; 32],
    ) -> Self {
        Self {
            fragment_flash: MemFlash::new(fragment_config.memory_size, fragment_config.erase_value),
            command_flash: MemFlash::new(command_config.memory_size, command_config.erase_value),
            fragment_config,
            command_config,
            crypto,
            public_key,
            reset_requested: RefCell::new(false),
        }
    }

    /// The currently stored metadata, ignoring validation failures — used
    /// only to seed [`FragmentSignatureValidator`]'s hash-chain starting
    /// link before a real fragment read/write is attempted.
    fn current_metadata(&self) -> Metadata {
        let validator = SignatureMetadataValidator::new(&self.crypto, self.public_key);
        let area = FragmentArea::init(&self.fragment_flash, self.fragment_config, AcceptAllFragments, validator)
            .expect("fixed, valid configuration");
        area.read_metadata().unwrap_or_else(|_| unsigned_metadata())
    }

    fn fragment_area(
        &self,
    ) -> FragmentArea<'_, MemFlash, FragmentSignatureValidator<'_, C>, SignatureMetadataValidator<'_, C>> {
        let metadata = self.current_metadata();
        let validate_fragment = FragmentSignatureValidator::new(&self.crypto, self.public_key, &metadata);
        let validate_metadata = SignatureMetadataValidator::new(&self.crypto, self.public_key);
        FragmentArea::init(&self.fragment_flash, self.fragment_config, validate_fragment, validate_metadata)
            .expect("fixed, valid configuration")
    }

    fn command_area(&self) -> CommandArea<'_, MemFlash> {
        CommandArea::init(&self.command_flash, self.command_config).expect("fixed, valid configuration")
    }

    /// Whether a `DATA_ID_RESET` write has been received since construction.
    pub fn reset_requested(&self) -> bool {
        *self.reset_requested.borrow()
    }

    /// Streams every stored fragment through [`verify_fragment_chain`]
    /// against the stored metadata, the same check a device installer runs
    /// before trusting an uploaded image.
    pub fn verify_installed_chain(&self) -> Result<bool, CoreError> {
        let area = self.fragment_area();
        let metadata = match area.read_metadata() {
            Ok(metadata) => metadata,
            Err(ReadOutcome::Empty) => return Ok(false),
            Err(ReadOutcome::Error(err)) => return Err(err),
        };

        let last = match area.find_last_fragment()? {
            SearchOutcome::Found(index) => index,
            SearchOutcome::Empty => return Ok(false),
            SearchOutcome::Invalid(_) => return Ok(false),
        };

        let first_flash_address = self.fragment_config.base_address
            + (self.fragment_config.sector_size as u32); // one metadata sector precedes fragment 0
        let fragments = (0..=last).map(|index| {
            area.read_fragment(index).map_err(|outcome| match outcome {
                ReadOutcome::Empty => CoreError::Invalid,
                ReadOutcome::Error(err) => err,
            })
        });

        verify_fragment_chain(&metadata, first_flash_address, fragments, &self.crypto, &self.public_key)
    }
}

impl<'a, C: Crypto> ReadDataById for &'a InMemoryServer<C> {
    fn read(&self, id: u8, out: &mut [u8]) -> (ProtocolResult, usize) {
        let metadata = match self.fragment_area().read_metadata() {
            Ok(metadata) => metadata,
            Err(_) => return (ProtocolResult::RequestFailed, 0),
        };

        match id {
            DATA_ID_FIRMWARE_VERSION if out.len() >= 4 => {
                out[..4].copy_from_slice(&metadata.version.to_le_bytes());
                (ProtocolResult::Ok, 4)
            }
            DATA_ID_FIRMWARE_TYPE if out.len() >= 4 => {
                out[..4].copy_from_slice(&metadata.firmware_type.to_le_bytes());
                (ProtocolResult::Ok, 4)
            }
            DATA_ID_FIRMWARE_NAME => {
                let name = metadata.name_str().as_bytes();
                let len = name.len().min(out.len());
                out[..len].copy_from_slice(&name[..len]);
                (ProtocolResult::Ok, len)
            }
            DATA_ID_FIRMWARE_VERSION | DATA_ID_FIRMWARE_TYPE => (ProtocolResult::InternalError, 0),
            _ => (ProtocolResult::RequestOutOfRange, 0),
        }
    }
}

impl<'a, C: Crypto> WriteDataById for &'a InMemoryServer<C> {
    fn write(&self, id: u8, data: &[u8]) -> ProtocolResult {
        match id {
            DATA_ID_ERASE_SLOT => {
                let Some(&index) = data.first() else {
                    return ProtocolResult::InvalidRequest;
                };
                match self.fragment_area().erase_fragment_slot(index as usize) {
                    Ok(()) => ProtocolResult::Ok,
                    Err(err) => core_error_to_protocol_result(err),
                }
            }
            DATA_ID_RESET => {
                *self.reset_requested.borrow_mut() = true;
                ProtocolResult::Ok
            }
            DATA_ID_FIRMWARE_UPDATE => match self.fragment_area().read_metadata() {
                Ok(metadata) => match self.command_area().write_install_command(CommandType::InstallFirmware, &metadata) {
                    Ok(()) => ProtocolResult::Ok,
                    Err(err) => core_error_to_protocol_result(err),
                },
                Err(ReadOutcome::Empty) => ProtocolResult::RequestFailed,
                Err(ReadOutcome::Error(err)) => core_error_to_protocol_result(err),
            },
            DATA_ID_FIRMWARE_ROLLBACK => match self.command_area().read_history() {
                Ok(metadata) => match self.command_area().write_install_command(CommandType::Rollback, &metadata) {
                    Ok(()) => ProtocolResult::Ok,
                    Err(err) => core_error_to_protocol_result(err),
                },
                Err(err) => core_error_to_protocol_result(err),
            },
            _ => ProtocolResult::RequestOutOfRange,
        }
    }
}

impl<'a, C: Crypto> PutMetadataHandler for &'a InMemoryServer<C> {
    fn put_metadata(&self, data: &[u8]) -> ProtocolResult {
        let Ok(metadata) = Metadata::decode(data) else {
            return ProtocolResult::InvalidRequest;
        };
        match self.fragment_area().write_metadata(&metadata) {
            Ok(()) => ProtocolResult::Ok,
            Err(err) => core_error_to_protocol_result(err),
        }
    }
}

impl<'a, C: Crypto> PutFragmentHandler for &'a InMemoryServer<C> {
    fn put_fragment(&self, data: &[u8]) -> ProtocolResult {
        let Ok(fragment) = Fragment::decode(data) else {
            return ProtocolResult::InvalidRequest;
        };
        let area = self.fragment_area();
        let index = fragment.number as usize;
        if let Err(err) = area.erase_fragment_slot(index) {
            return core_error_to_protocol_result(err);
        }
        match area.write_fragment(index, &fragment) {
            Ok(()) => ProtocolResult::Ok,
            Err(err) => core_error_to_protocol_result(err),
        }
    }
}
