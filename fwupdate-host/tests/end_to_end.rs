//! End-to-end coverage through the in-memory test server and the real
//! `DalekCrypto` backend, exercising the storage, protocol, and host-tool
//! layers together the way a real upload session would.
//!
//! Grounded in `updateclient/testserver.cpp`'s own integration tests
//! (`tests/updateclient/*`), which drive the simulated device through the
//! same wire protocol a real one speaks rather than calling storage
//! functions directly.

use std::cell::RefCell;
use std::io::Cursor;

use fwupdate_core::{
    CommandArea, CommandType, CoreError, Fragment, FlashDevice, FragmentArea, FragmentSignatureValidator,
    FragmentValidator, Metadata, MemoryConfig, MetadataValidator, ProtocolResult, ReadOutcome, SearchOutcome,
    SignatureMetadataValidator, Status, TransferBuffer, UpdateServer,
};
use fwupdate_core::codec::{FRAGMENT_CONTENT_SIZE, METADATA_SIZE};
use fwupdate_core::installer::verify_fragment_chain;
use fwupdate_core::protocol::{
    SID_PING, SID_READ_DATA_BY_ID, TRANSFER_MULTI_PACKET_END, TRANSFER_MULTI_PACKET_INIT,
    TRANSFER_MULTI_PACKET_TRANSFER, TRANSFER_SINGLE_PACKET,
};

use fwupdate_crypto::DalekCrypto;
use fwupdate_host::hexfile::{HexFile, Section};
use fwupdate_host::keyfile::KeyPair;
use fwupdate_host::sign::{sign_fragments_ed25519, sign_fragments_hash_chain, sign_firmware_image};
use fwupdate_host::testserver::InMemoryServer;

// -----------------------------------------------------------------------------
// Shared test flash double
// -----------------------------------------------------------------------------

struct TestFlash {
    data: RefCell<Vec<u8>>,
}

impl TestFlash {
    fn new(size: usize, erase_value: u8) -> Self {
        Self {
            data: RefCell::new(vec![erase_value; size]),
        }
    }
}

impl FlashDevice for TestFlash {
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

struct AcceptAll;
impl FragmentValidator for AcceptAll {
    fn validate(&self, _: &Fragment) -> bool {
        true
    }
}
impl MetadataValidator for AcceptAll {
    fn validate(&self, _: &Metadata) -> bool {
        true
    }
}

const SECTOR_SIZE: usize = 8192; // large enough to hold one fragment (4164 bytes)
// One more fragment sector than `WRITTEN_FRAGMENTS` uses: `max_fragment_index`
// (see `fragment_area.rs`) is derived the same way the original's
// `FA_GetMaxFragmentIndex` is and, like the original's own `FA_FindLastFragment`,
// is only safe to probe up to the last slot that is actually empty or valid —
// writing fragments all the way out to that literal boundary isn't a pattern
// the original's own tests exercise either, so this leaves one slot of margin.
const FRAGMENT_AREA_SECTORS: usize = 5;
const WRITTEN_FRAGMENTS: usize = 4;
const FRAGMENT_MEMORY_SIZE: usize = SECTOR_SIZE * (1 + FRAGMENT_AREA_SECTORS);
const COMMAND_SECTOR_SIZE: usize = 256;
const COMMAND_MEMORY_SIZE: usize = COMMAND_SECTOR_SIZE * 3;

fn fragment_config() -> MemoryConfig {
    MemoryConfig {
        base_address: 0,
        sector_size: SECTOR_SIZE,
        memory_size: FRAGMENT_MEMORY_SIZE,
        erase_value: 0xFF,
    }
}

fn command_config() -> MemoryConfig {
    MemoryConfig {
        base_address: 0,
        sector_size: COMMAND_SECTOR_SIZE,
        memory_size: COMMAND_MEMORY_SIZE,
        erase_value: 0xFF,
    }
}

fn sample_metadata(firmware_size: u32) -> Metadata {
    Metadata {
        firmware_type: 7,
        version: 1,
        rollback_number: 0,
        firmware_id: 99,
        start_address: SECTOR_SIZE as u32,
        firmware_size,
        name: *b"end-to-end\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0",
        firmware_signature: [0; 64],
        metadata_signature: [0; 64],
    }
}

fn sample_fragment(number: u32, byte: u8) -> Fragment {
    Fragment {
        firmware_id: 99,
        number,
        start_address: SECTOR_SIZE as u32 + number * FRAGMENT_CONTENT_SIZE as u32,
        size: 4,
        content: {
            let mut content = [0u8; FRAGMENT_CONTENT_SIZE];
            content[..4].copy_from_slice(&[byte, byte, byte, byte]);
            content
        },
        verify_method: 0,
        signature: [0; 64],
        sha512: [0; 64],
    }
}

// -----------------------------------------------------------------------------
// Scenario 1: fresh-flash probe
// -----------------------------------------------------------------------------

#[test]
fn fresh_flash_probe_reports_empty() {
    let flash = TestFlash::new(FRAGMENT_MEMORY_SIZE, 0xFF);
    let area = FragmentArea::init(&flash, fragment_config(), AcceptAll, AcceptAll).unwrap();

    assert!(matches!(area.read_metadata(), Err(ReadOutcome::Empty)));
    assert!(matches!(area.find_last_fragment().unwrap(), SearchOutcome::Empty));
    assert!(area.max_fragment_index() >= WRITTEN_FRAGMENTS - 1);
}

// -----------------------------------------------------------------------------
// Scenarios 2 & 3: full image write, round trip, and corruption detection
// -----------------------------------------------------------------------------

#[test]
fn full_image_write_round_trips_then_detects_corruption() {
    let crypto = DalekCrypto;
    let keypair = KeyPair::generate();

    let mut metadata = sample_metadata(16);
    let firmware_image: Vec<u8> = (0..WRITTEN_FRAGMENTS as u32).flat_map(|i| [i as u8; 4]).collect();
    let section = Section {
        start_address: metadata.start_address,
        data: firmware_image,
    };
    assert!(sign_firmware_image(&mut metadata, &section, &crypto, &keypair.secret_key, &keypair.public_key));

    let mut fragments: Vec<Fragment> = (0..WRITTEN_FRAGMENTS as u32).map(|i| sample_fragment(i, i as u8)).collect();
    assert!(sign_fragments_ed25519(&mut fragments, &crypto, &keypair.secret_key, &keypair.public_key));

    let flash = TestFlash::new(FRAGMENT_MEMORY_SIZE, 0xFF);
    let validate_fragment = FragmentSignatureValidator::new(&crypto, keypair.public_key, &metadata);
    let validate_metadata = SignatureMetadataValidator::new(&crypto, keypair.public_key);
    let area = FragmentArea::init(&flash, fragment_config(), validate_fragment, validate_metadata).unwrap();

    area.write_metadata(&metadata).unwrap();
    assert_eq!(area.read_metadata().unwrap(), metadata);

    for (i, fragment) in fragments.iter().enumerate() {
        area.write_fragment(i, fragment).unwrap();
    }

    let last = area.find_last_fragment().unwrap();
    assert_eq!(last, SearchOutcome::Found(WRITTEN_FRAGMENTS - 1));
    assert_eq!(area.find_last_fragment_linear().unwrap(), last);

    for (i, fragment) in fragments.iter().enumerate() {
        assert_eq!(area.read_fragment(i).unwrap(), *fragment);
    }

    // Flip a byte inside the metadata header's signed range: the signature no
    // longer matches, so the real validator now rejects it (previously only
    // the magic was checked, and this byte sits well past it).
    flash.data.borrow_mut()[METADATA_SIZE / 2] ^= 0x01;
    assert!(matches!(area.read_metadata(), Err(ReadOutcome::Error(CoreError::Invalid))));

    // Flip a byte inside fragment 0's slot (its `firmware_id`, covered by the
    // fragment's own Ed25519 signature).
    let fragment_0_address = SECTOR_SIZE; // one metadata sector precedes fragment 0
    flash.data.borrow_mut()[fragment_0_address] ^= 0x01;
    assert!(matches!(area.read_fragment(0), Err(ReadOutcome::Error(CoreError::Invalid))));
}

// -----------------------------------------------------------------------------
// Scenario 4: CommandArea lifecycle
// -----------------------------------------------------------------------------

#[test]
fn command_area_lifecycle_tracks_priority() {
    let flash = TestFlash::new(COMMAND_MEMORY_SIZE, 0xFF);
    let area = CommandArea::init(&flash, command_config()).unwrap();

    let metadata = sample_metadata(16);
    area.write_install_command(CommandType::InstallFirmware, &metadata).unwrap();
    assert_eq!(area.get_status(), Status::None);
    assert_eq!(area.read_install_command().unwrap(), (CommandType::InstallFirmware, metadata));

    area.set_status(Status::HistoryWritten).unwrap();
    area.set_status(Status::FirmwareWritten).unwrap();
    area.set_status(Status::Failed).unwrap();

    assert_eq!(area.get_status(), Status::Failed);
}

// -----------------------------------------------------------------------------
// Scenario 5: transfer segmentation
// -----------------------------------------------------------------------------

#[test]
fn transfer_segmentation_reassembles_payload() {
    let server = InMemoryServer::new(fragment_config(), command_config(), fwupdate_crypto::DalekCrypto, [0; 32]);
    let us = UpdateServer::new(&server, &server, &server, &server);
    let mut backing = [0u8; 64];
    let mut transfer = TransferBuffer::new(&us, &mut backing).unwrap();

    // A 3-byte logical request (PING plus two garbage bytes) split across
    // INIT/TRANSFER/TRANSFER/END.
    let mut packet = [0u8; 16];

    packet[0] = TRANSFER_MULTI_PACKET_INIT;
    packet[1..5].copy_from_slice(&3u32.to_be_bytes());
    let len = transfer.process(&mut packet, 5);
    assert_eq!(&packet[..len], &[TRANSFER_SINGLE_PACKET, 0x00, ProtocolResult::Ok.into()]);

    packet[0] = TRANSFER_MULTI_PACKET_TRANSFER;
    packet[1] = SID_PING;
    let len = transfer.process(&mut packet, 2);
    assert_eq!(&packet[..len], &[TRANSFER_SINGLE_PACKET, 0x00, ProtocolResult::Ok.into()]);

    packet[0] = TRANSFER_MULTI_PACKET_TRANSFER;
    packet[1] = 0xAA;
    packet[2] = 0xBB;
    let len = transfer.process(&mut packet, 3);
    assert_eq!(&packet[..len], &[TRANSFER_SINGLE_PACKET, 0x00, ProtocolResult::Ok.into()]);

    packet[0] = TRANSFER_MULTI_PACKET_END;
    let len = transfer.process(&mut packet, 1);
    // The reassembled request is [SID_PING, 0xAA, 0xBB] (3 bytes, not the
    // valid 1-byte PING), so the server NACKs it with InvalidRequest — the
    // point of this assertion is that exactly one request reached the
    // server, carrying the full concatenated payload rather than three
    // separate ones.
    assert_eq!(&packet[..len], &[TRANSFER_SINGLE_PACKET, SID_PING, ProtocolResult::InvalidRequest.into()]);
}

// -----------------------------------------------------------------------------
// Scenario 6: protocol negative responses
// -----------------------------------------------------------------------------

#[test]
fn protocol_negative_responses() {
    let server = InMemoryServer::new(fragment_config(), command_config(), fwupdate_crypto::DalekCrypto, [0; 32]);
    let us = UpdateServer::new(&server, &server, &server, &server);
    let mut response = [0u8; 8];

    // Unknown service id.
    let len = us.process_request(&[0x00], &mut response);
    assert_eq!(&response[..len], &[0x00, ProtocolResult::RequestOutOfRange.into()]);

    // PING with trailing garbage.
    let len = us.process_request(&[SID_PING, 0xFF], &mut response);
    assert_eq!(&response[..len], &[SID_PING, ProtocolResult::InvalidRequest.into()]);

    // READ_DATA_BY_ID with an unknown id, once metadata exists to read against.
    let mut put_metadata_request = vec![fwupdate_core::protocol::SID_PUT_METADATA];
    put_metadata_request.extend_from_slice(&sample_metadata(16).encode());
    us.process_request(&put_metadata_request, &mut response);

    let len = us.process_request(&[SID_READ_DATA_BY_ID, 0xFE], &mut response);
    assert_eq!(&response[..len], &[SID_READ_DATA_BY_ID, ProtocolResult::RequestOutOfRange.into()]);
}

// -----------------------------------------------------------------------------
// Scenario 7: fragment-chain installer round trip with real crypto
// -----------------------------------------------------------------------------

#[test]
fn hash_chain_fragment_verification_detects_single_byte_tamper() {
    let crypto = DalekCrypto;
    let keypair = KeyPair::generate();

    let firmware_image: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
    let mut metadata = sample_metadata(8);
    let section = Section {
        start_address: metadata.start_address,
        data: firmware_image.to_vec(),
    };
    assert!(sign_firmware_image(&mut metadata, &section, &crypto, &keypair.secret_key, &keypair.public_key));

    let mut fragments = vec![sample_fragment(0, 0), sample_fragment(1, 0)];
    fragments[0].size = 4;
    fragments[0].content[..4].copy_from_slice(&firmware_image[..4]);
    fragments[1].size = 4;
    fragments[1].content[..4].copy_from_slice(&firmware_image[4..]);
    sign_fragments_hash_chain(&mut fragments, &metadata, &crypto);

    let first_flash_address = SECTOR_SIZE as u32;
    let ok = verify_fragment_chain(
        &metadata,
        first_flash_address,
        fragments.clone().into_iter().map(Ok::<_, CoreError>),
        &crypto,
        &keypair.public_key,
    )
    .unwrap();
    assert!(ok, "a correctly signed hash-chained image must verify");

    // Byte 5 sits past this fragment's declared `size` (4), so it never
    // reaches the firmware-wide Ed25519 verifier — only the hash chain,
    // which covers every byte of the fragment, can catch this tamper.
    let mut tampered = fragments;
    tampered[1].content[5] ^= 0x01;
    let tampered_ok = verify_fragment_chain(
        &metadata,
        first_flash_address,
        tampered.into_iter().map(Ok::<_, CoreError>),
        &crypto,
        &keypair.public_key,
    )
    .unwrap();
    assert!(!tampered_ok, "the hash chain must catch a tampered byte outside the firmware-wide signed range");
}

// -----------------------------------------------------------------------------
// Scenario 8: host round trip (HEX + OpenSSH key file)
// -----------------------------------------------------------------------------

#[test]
fn hex_file_round_trips_through_write_and_read() {
    let original = vec![0x10u8, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];
    let start_address = 0x0001_0000u32;

    let hex = HexFile {
        sections: vec![Section {
            start_address,
            data: original.clone(),
        }],
    };

    let mut buf = Vec::new();
    hex.to_writer(&mut buf).unwrap();

    let parsed = HexFile::from_reader(Cursor::new(buf)).unwrap();
    let section = parsed.single_section().unwrap();
    assert_eq!(section.start_address, start_address);
    assert_eq!(section.data, original);
}

#[test]
fn generated_key_file_round_trips_and_passes_verify_keys() {
    let keypair = KeyPair::generate();
    let pem_text = keypair.to_pem("end-to-end test key");

    let parsed = KeyPair::from_pem(&pem_text).unwrap();
    assert_eq!(parsed.public_key, keypair.public_key);
    assert_eq!(parsed.secret_key, keypair.secret_key);
    assert!(parsed.verify());
}
