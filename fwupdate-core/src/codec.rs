//! Byte-exact, field-by-field encode/decode for the on-flash/on-wire records.
//!
//! Neither [`Metadata`] nor [`Fragment`] is ever cast from its in-memory
//! layout: every field is serialized at its declared offset and width, so
//! the wire format does not depend on Rust's struct layout or target
//! endianness.

use core::convert::TryInto;

pub const METADATA_MAGIC: &[u8; 16] = b"_M_E_T_A_D_A_T_A";
pub const METADATA_NAME_SIZE: usize = 32;
pub const METADATA_SIZE: usize = 200;

pub const FRAGMENT_CONTENT_SIZE: usize = 4016;
pub const FRAGMENT_SIZE: usize = 4164;

const MD_OFF_MAGIC: usize = 0;
const MD_OFF_TYPE: usize = 16;
const MD_OFF_VERSION: usize = 20;
const MD_OFF_ROLLBACK_NUMBER: usize = 24;
const MD_OFF_FIRMWARE_ID: usize = 28;
const MD_OFF_START_ADDRESS: usize = 32;
const MD_OFF_FIRMWARE_SIZE: usize = 36;
const MD_OFF_NAME: usize = 40;
const MD_OFF_FIRMWARE_SIGNATURE: usize = 72;
const MD_OFF_METADATA_SIGNATURE: usize = 136;

const FRAG_OFF_FIRMWARE_ID: usize = 0;
const FRAG_OFF_NUMBER: usize = 4;
const FRAG_OFF_START_ADDRESS: usize = 8;
const FRAG_OFF_SIZE: usize = 12;
const FRAG_OFF_CONTENT: usize = 16;
const FRAG_OFF_VERIFY_METHOD: usize = 4032;
const FRAG_OFF_SIGNATURE: usize = 4036;
const FRAG_OFF_SHA512: usize = 4100;

/// A decode error: the buffer was the wrong length or carried a bad magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    WrongLength,
    BadMagic,
}

/// The Ed25519 verification scheme a [`Fragment`] was signed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMethod {
    /// `signature` is an Ed25519 signature over the fragment.
    Ed25519 = 0,
    /// `sha512` chains into the previous fragment's digest.
    HashChain = 1,
}

impl VerifyMethod {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(VerifyMethod::Ed25519),
            1 => Some(VerifyMethod::HashChain),
            _ => None,
        }
    }
}

/// Signed header identifying one firmware image and authenticating its
/// fragments. See the data model section for the exact wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub firmware_type: u32,
    pub version: u32,
    pub rollback_number: u32,
    pub firmware_id: u32,
    pub start_address: u32,
    pub firmware_size: u32,
    pub name: [u8; METADATA_NAME_SIZE],
    pub firmware_signature: [u8; 64],
    pub metadata_signature: [u8; 64],
}

impl Metadata {
    pub fn encode(&self) -> [u8; METADATA_SIZE] {
        let mut buf = [0u8; METADATA_SIZE];
        buf[MD_OFF_MAGIC..MD_OFF_MAGIC + 16].copy_from_slice(METADATA_MAGIC);
        buf[MD_OFF_TYPE..MD_OFF_TYPE + 4].copy_from_slice(&self.firmware_type.to_le_bytes());
        buf[MD_OFF_VERSION..MD_OFF_VERSION + 4].copy_from_slice(&self.version.to_le_bytes());
        buf[MD_OFF_ROLLBACK_NUMBER..MD_OFF_ROLLBACK_NUMBER + 4]
            .copy_from_slice(&self.rollback_number.to_le_bytes());
        buf[MD_OFF_FIRMWARE_ID..MD_OFF_FIRMWARE_ID + 4]
            .copy_from_slice(&self.firmware_id.to_le_bytes());
        buf[MD_OFF_START_ADDRESS..MD_OFF_START_ADDRESS + 4]
            .copy_from_slice(&self.start_address.to_le_bytes());
        buf[MD_OFF_FIRMWARE_SIZE..MD_OFF_FIRMWARE_SIZE + 4]
            .copy_from_slice(&self.firmware_size.to_le_bytes());
        buf[MD_OFF_NAME..MD_OFF_NAME + METADATA_NAME_SIZE].copy_from_slice(&self.name);
        buf[MD_OFF_FIRMWARE_SIGNATURE..MD_OFF_FIRMWARE_SIGNATURE + 64]
            .copy_from_slice(&self.firmware_signature);
        buf[MD_OFF_METADATA_SIGNATURE..MD_OFF_METADATA_SIGNATURE + 64]
            .copy_from_slice(&self.metadata_signature);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != METADATA_SIZE {
            return Err(DecodeError::WrongLength);
        }
        if &bytes[MD_OFF_MAGIC..MD_OFF_MAGIC + 16] != METADATA_MAGIC.as_slice() {
            return Err(DecodeError::BadMagic);
        }

        Ok(Metadata {
            firmware_type: u32_at(bytes, MD_OFF_TYPE),
            version: u32_at(bytes, MD_OFF_VERSION),
            rollback_number: u32_at(bytes, MD_OFF_ROLLBACK_NUMBER),
            firmware_id: u32_at(bytes, MD_OFF_FIRMWARE_ID),
            start_address: u32_at(bytes, MD_OFF_START_ADDRESS),
            firmware_size: u32_at(bytes, MD_OFF_FIRMWARE_SIZE),
            name: bytes[MD_OFF_NAME..MD_OFF_NAME + METADATA_NAME_SIZE]
                .try_into()
                .unwrap(),
            firmware_signature: bytes
                [MD_OFF_FIRMWARE_SIGNATURE..MD_OFF_FIRMWARE_SIGNATURE + 64]
                .try_into()
                .unwrap(),
            metadata_signature: bytes
                [MD_OFF_METADATA_SIGNATURE..MD_OFF_METADATA_SIGNATURE + 64]
                .try_into()
                .unwrap(),
        })
    }

    /// Parses the fixed-size fields without checking the magic.
    ///
    /// Used by [`crate::command_area`], which stores a `Metadata` payload
    /// that some other layer already validated (or deliberately left empty/
    /// erased) — re-rejecting it on magic mismatch here would turn "install
    /// region was never written" into a spurious error.
    pub(crate) fn decode_unchecked(bytes: &[u8; METADATA_SIZE]) -> Self {
        Metadata {
            firmware_type: u32_at(bytes, MD_OFF_TYPE),
            version: u32_at(bytes, MD_OFF_VERSION),
            rollback_number: u32_at(bytes, MD_OFF_ROLLBACK_NUMBER),
            firmware_id: u32_at(bytes, MD_OFF_FIRMWARE_ID),
            start_address: u32_at(bytes, MD_OFF_START_ADDRESS),
            firmware_size: u32_at(bytes, MD_OFF_FIRMWARE_SIZE),
            name: bytes[MD_OFF_NAME..MD_OFF_NAME + METADATA_NAME_SIZE]
                .try_into()
                .unwrap(),
            firmware_signature: bytes
                [MD_OFF_FIRMWARE_SIGNATURE..MD_OFF_FIRMWARE_SIGNATURE + 64]
                .try_into()
                .unwrap(),
            metadata_signature: bytes
                [MD_OFF_METADATA_SIGNATURE..MD_OFF_METADATA_SIGNATURE + 64]
                .try_into()
                .unwrap(),
        }
    }

    /// `name`, trimmed at the first NUL byte. Empty if the field isn't valid UTF-8.
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Byte range of an encoded metadata record that `metadata_signature` is computed over:
    /// everything preceding that field.
    pub fn signed_range(encoded: &[u8; METADATA_SIZE]) -> &[u8] {
        &encoded[..MD_OFF_METADATA_SIGNATURE]
    }
}

/// A fixed-size, self-describing firmware slice. See the data model section
/// for the exact wire layout and the two verification modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub firmware_id: u32,
    pub number: u32,
    pub start_address: u32,
    pub size: u32,
    pub content: [u8; FRAGMENT_CONTENT_SIZE],
    pub verify_method: u32,
    pub signature: [u8; 64],
    pub sha512: [u8; 64],
}

impl Fragment {
    pub fn encode(&self) -> [u8; FRAGMENT_SIZE] {
        let mut buf = [0u8; FRAGMENT_SIZE];
        buf[FRAG_OFF_FIRMWARE_ID..FRAG_OFF_FIRMWARE_ID + 4]
            .copy_from_slice(&self.firmware_id.to_le_bytes());
        buf[FRAG_OFF_NUMBER..FRAG_OFF_NUMBER + 4].copy_from_slice(&self.number.to_le_bytes());
        buf[FRAG_OFF_START_ADDRESS..FRAG_OFF_START_ADDRESS + 4]
            .copy_from_slice(&self.start_address.to_le_bytes());
        buf[FRAG_OFF_SIZE..FRAG_OFF_SIZE + 4].copy_from_slice(&self.size.to_le_bytes());
        buf[FRAG_OFF_CONTENT..FRAG_OFF_CONTENT + FRAGMENT_CONTENT_SIZE]
            .copy_from_slice(&self.content);
        buf[FRAG_OFF_VERIFY_METHOD..FRAG_OFF_VERIFY_METHOD + 4]
            .copy_from_slice(&self.verify_method.to_le_bytes());
        buf[FRAG_OFF_SIGNATURE..FRAG_OFF_SIGNATURE + 64].copy_from_slice(&self.signature);
        buf[FRAG_OFF_SHA512..FRAG_OFF_SHA512 + 64].copy_from_slice(&self.sha512);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != FRAGMENT_SIZE {
            return Err(DecodeError::WrongLength);
        }

        Ok(Fragment {
            firmware_id: u32_at(bytes, FRAG_OFF_FIRMWARE_ID),
            number: u32_at(bytes, FRAG_OFF_NUMBER),
            start_address: u32_at(bytes, FRAG_OFF_START_ADDRESS),
            size: u32_at(bytes, FRAG_OFF_SIZE),
            content: bytes[FRAG_OFF_CONTENT..FRAG_OFF_CONTENT + FRAGMENT_CONTENT_SIZE]
                .try_into()
                .unwrap(),
            verify_method: u32_at(bytes, FRAG_OFF_VERIFY_METHOD),
            signature: bytes[FRAG_OFF_SIGNATURE..FRAG_OFF_SIGNATURE + 64]
                .try_into()
                .unwrap(),
            sha512: bytes[FRAG_OFF_SHA512..FRAG_OFF_SHA512 + 64]
                .try_into()
                .unwrap(),
        })
    }

    pub fn verify_method(&self) -> Option<VerifyMethod> {
        VerifyMethod::from_u32(self.verify_method)
    }

    /// The two byte ranges of an encoded fragment that are signed in Ed25519
    /// mode (`verify_method = 0`): everything except the `signature` field
    /// itself, which sits before `sha512` rather than at the end of the
    /// record.
    pub fn method0_signed_ranges(encoded: &[u8; FRAGMENT_SIZE]) -> (&[u8], &[u8]) {
        (&encoded[..FRAG_OFF_SIGNATURE], &encoded[FRAG_OFF_SHA512..])
    }

    /// Byte range hashed into the chain in hash-chain mode (`verify_method = 1`):
    /// everything preceding the `sha512` field.
    pub fn method1_chained_range(encoded: &[u8; FRAGMENT_SIZE]) -> &[u8] {
        &encoded[..FRAG_OFF_SHA512]
    }
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}
