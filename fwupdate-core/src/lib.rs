//! Durable-storage and protocol core for over-the-air firmware updates.
//!
//! `no_std`, no allocation: [`fragment_area`] and [`command_area`] are the
//! flash-resident storage layer, [`update_server`] and [`transfer`] are the
//! wire protocol, and [`installer`] verifies a received image's signature
//! before it is trusted. Everything here is generic over the capability
//! traits in [`traits`] — flash access, cryptography, and per-record
//! validation are all supplied by the caller, never hard-wired.
#![cfg_attr(not(test), no_std)]

pub mod codec;
pub mod command_area;
pub mod crc32;
pub mod error;
pub mod fragment_area;
pub mod installer;
pub mod protocol;
pub mod traits;
pub mod transfer;
pub mod update_server;
pub mod validate;

pub use codec::{DecodeError, Fragment, Metadata, VerifyMethod};
pub use command_area::{CommandArea, CommandType, Status};
pub use error::{CoreError, ProtocolResult, ReadOutcome, SearchOutcome};
pub use fragment_area::FragmentArea;
pub use traits::{Crypto, FlashDevice, FragmentValidator, MemoryConfig, MetadataValidator, MultipartVerifier};
pub use transfer::TransferBuffer;
pub use update_server::UpdateServer;
pub use validate::{FragmentSignatureValidator, SignatureMetadataValidator};
