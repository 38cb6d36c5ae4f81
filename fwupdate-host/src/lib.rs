//! Host-side tooling for fwupdate: Intel HEX handling, OpenSSH Ed25519 key
//! management, the two offline signing schemes, and an UDP client plus
//! in-memory loopback server for talking to a device.

pub mod error;
pub mod firmware;
pub mod hexfile;
pub mod keyfile;
pub mod sign;
pub mod testserver;
pub mod transport;

pub use error::CliError;
pub use firmware::FirmwareImage;
pub use hexfile::HexFile;
pub use keyfile::KeyPair;
