//! Capability interfaces injected into the storage/protocol types.
//!
//! The original expresses these as function pointers bundled into config
//! structs (`ReadMemory_t`/`WriteMemory_t`/`EraseSectors_t`,
//! `ValidateFragment_t`/`ValidateMetadata_t`, the crypto hook). Here they are
//! small traits, generic over the implementor and passed by borrow — never
//! `dyn`, and never a raw function pointer.

use crate::codec::{Fragment, Metadata};
use crate::error::CoreError;

/// Static configuration of a flash-backed area: base address, sector size,
/// total size, and the byte value an erased cell reads back as. Plain data,
/// unlike the capability traits below — mirrors `MemoryConfig_t`'s four
/// scalar fields (the function pointers in that struct become [`FlashDevice`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    pub base_address: u32,
    pub sector_size: usize,
    pub memory_size: usize,
    pub erase_value: u8,
}

/// NOR-flash read/write/erase primitives.
///
/// `write` only clears bits (`old AND new`); restoring bits to `1` requires
/// `erase` over a whole sector-aligned span. A conforming implementation
/// returns `Err(CoreError::Busy)` on any failure to service the request —
/// this trait never raises `Param`/`Invalid` itself, those are judgements the
/// storage layer above it makes.
pub trait FlashDevice {
    fn read(&self, address: u32, out: &mut [u8]) -> Result<(), CoreError>;
    fn write(&self, address: u32, data: &[u8]) -> Result<(), CoreError>;
    fn erase(&self, address: u32, size: usize) -> Result<(), CoreError>;
}

/// A streaming Ed25519 verification in progress, seeded with one signature
/// and public key. Mirrors `ed25519_multipart_continue`/`_end`.
pub trait MultipartVerifier {
    fn update(&mut self, data: &[u8]);
    /// Consumes the context and returns whether the accumulated message
    /// matches the signature it was seeded with.
    fn finish(self) -> bool;
}

/// The cryptographic primitives this crate treats as external: Ed25519
/// sign/verify, SHA-512, and the streaming multi-part verify used by the
/// fragment-chain installer (§4.5).
pub trait Crypto {
    type Verifier: MultipartVerifier;

    /// Begins a streaming verification against `signature` and `public_key`.
    /// Returns `None` if the signature's top scalar byte has bit 5 set (the
    /// same malleability check as `ed25519_multipart_init`).
    fn begin_verify(&self, public_key: &[u8; 32], signature: &[u8; 64]) -> Option<Self::Verifier>;

    /// One-shot verify over a single contiguous message.
    fn verify(&self, public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
        match self.begin_verify(public_key, signature) {
            Some(mut verifier) => {
                verifier.update(message);
                verifier.finish()
            }
            None => false,
        }
    }

    fn sha512(&self, message: &[u8]) -> [u8; 64];

    /// Signs `message` with `secret_key`. Host-side tooling only; nothing in
    /// `fwupdate-core` itself ever signs.
    fn sign(&self, secret_key: &[u8; 32], message: &[u8]) -> [u8; 64];
}

/// Per-record fragment validator, injected into [`crate::fragment_area::FragmentArea`].
///
/// A conforming implementation checks whatever `fragment.verify_method()`
/// names: a per-fragment Ed25519 signature, or this slot's link in a
/// SHA-512 hash chain (which needs to track state across calls — see
/// [`crate::validate::FragmentSignatureValidator`]). Either way this is a
/// check on one slot at a time; it does not re-derive the whole chain from
/// scratch the way [`crate::installer::verify_fragment_chain`] does when it
/// re-verifies an entire stored image end to end.
pub trait FragmentValidator {
    fn validate(&self, fragment: &Fragment) -> bool;
}

/// Per-record metadata validator, injected into `FragmentArea`.
pub trait MetadataValidator {
    fn validate(&self, metadata: &Metadata) -> bool;
}
