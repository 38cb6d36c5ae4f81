//! Hand-rolled error enums for the host tooling, in the same style as
//! [`fwupdate_core::error`]: one enum per failure domain, a `Display` impl
//! instead of a derive macro, no `anyhow`/`thiserror`.

use std::fmt;

/// Something went wrong parsing or writing an Intel HEX file.
#[derive(Debug)]
pub enum HexFileError {
    Io(std::io::Error),
    /// Line didn't start with `:`, had an odd digit count, bad checksum, or
    /// a malformed byte count field.
    MalformedLine { line: usize, reason: &'static str },
    UnsupportedRecordType { line: usize, record_type: u8 },
    /// The firmware image wasn't laid out as exactly one contiguous section.
    UnexpectedSectionCount(usize),
}

impl fmt::Display for HexFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HexFileError::Io(err) => write!(f, "I/O error: {err}"),
            HexFileError::MalformedLine { line, reason } => {
                write!(f, "invalid record on line {line}: {reason}")
            }
            HexFileError::UnsupportedRecordType { line, record_type } => {
                write!(f, "unsupported record type {record_type:#04x} on line {line}")
            }
            HexFileError::UnexpectedSectionCount(count) => {
                write!(f, "expected exactly one HEX section, found {count}")
            }
        }
    }
}

impl std::error::Error for HexFileError {}

impl From<std::io::Error> for HexFileError {
    fn from(err: std::io::Error) -> Self {
        HexFileError::Io(err)
    }
}

/// Something went wrong parsing an OpenSSH Ed25519 private key file.
#[derive(Debug)]
pub enum KeyFileError {
    Io(std::io::Error),
    Pem(String),
    /// The binary key blob ended before a length-prefixed field could be
    /// read in full.
    Truncated,
    BadMagic,
    UnsupportedCipher(String),
    UnexpectedKeyCount(u32),
    UnsupportedKeyType(String),
    /// The derived public key doesn't match the one stored in the file, or
    /// a throwaway sign/verify round trip with the parsed keys failed.
    KeyMismatch,
}

impl fmt::Display for KeyFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFileError::Io(err) => write!(f, "I/O error: {err}"),
            KeyFileError::Pem(msg) => write!(f, "malformed PEM: {msg}"),
            KeyFileError::Truncated => write!(f, "key file ended unexpectedly"),
            KeyFileError::BadMagic => write!(f, "missing \"openssh-key-v1\" header"),
            KeyFileError::UnsupportedCipher(name) => {
                write!(f, "unsupported cipher {name:?} (only unencrypted keys are supported)")
            }
            KeyFileError::UnexpectedKeyCount(n) => write!(f, "expected exactly one key, file has {n}"),
            KeyFileError::UnsupportedKeyType(name) => write!(f, "unsupported key type {name:?}, expected ssh-ed25519"),
            KeyFileError::KeyMismatch => write!(f, "key file failed its own sanity check"),
        }
    }
}

impl std::error::Error for KeyFileError {}

impl From<std::io::Error> for KeyFileError {
    fn from(err: std::io::Error) -> Self {
        KeyFileError::Io(err)
    }
}

/// A HEX section couldn't be split into a metadata header and fragments.
#[derive(Debug)]
pub enum FirmwareError {
    /// The section is shorter than one metadata record.
    TooShortForMetadata,
    MetadataDecode(fwupdate_core::DecodeError),
    /// `metadata.start_address` doesn't fall within the section the
    /// metadata itself was read from — mirrors `CheckMetadataMem`.
    StartAddressOutOfSection,
}

impl fmt::Display for FirmwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareError::TooShortForMetadata => write!(f, "section is shorter than one metadata record"),
            FirmwareError::MetadataDecode(err) => write!(f, "failed to decode metadata: {err:?}"),
            FirmwareError::StartAddressOutOfSection => {
                write!(f, "metadata start address does not fall within its own section")
            }
        }
    }
}

impl std::error::Error for FirmwareError {}

/// Top-level error surfaced by the CLI binaries.
#[derive(Debug)]
pub enum CliError {
    Hex(HexFileError),
    Key(KeyFileError),
    Firmware(FirmwareError),
    Io(std::io::Error),
    /// A device responded with a negative acknowledgement, or didn't
    /// respond with a well-formed one at all.
    DeviceRejected(&'static str),
    InvalidArgument(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Hex(err) => write!(f, "{err}"),
            CliError::Key(err) => write!(f, "{err}"),
            CliError::Firmware(err) => write!(f, "{err}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::DeviceRejected(what) => write!(f, "device rejected {what}"),
            CliError::InvalidArgument(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<HexFileError> for CliError {
    fn from(err: HexFileError) -> Self {
        CliError::Hex(err)
    }
}

impl From<KeyFileError> for CliError {
    fn from(err: KeyFileError) -> Self {
        CliError::Key(err)
    }
}

impl From<FirmwareError> for CliError {
    fn from(err: FirmwareError) -> Self {
        CliError::Firmware(err)
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err)
    }
}
