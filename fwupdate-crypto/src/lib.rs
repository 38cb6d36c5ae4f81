//! `std`-backed [`fwupdate_core::traits::Crypto`] implementation over
//! `ed25519-dalek` and `sha2`.
//!
//! Deliberately its own crate rather than folded into `fwupdate-core`: the
//! durable-storage/protocol core stays buildable for an embedded target
//! without pulling in an allocator-hungry signature stack, and a real device
//! supplies its own `Crypto` (typically backed by a hardware accelerator)
//! instead of linking this one. This implementation backs the host tooling
//! and the test fixtures that exercise the fragment-chain verification
//! algorithm end to end (`fwupdate-core::installer`).
//!
//! [`DalekVerifier`] buffers the streamed message in a `Vec<u8>` rather than
//! hashing incrementally: this crate has `alloc` (it is never linked into a
//! `no_std` build), so there is no pressure to avoid it, and doing so lets
//! verification go through `ed25519_dalek`'s own `verify_strict` instead of
//! re-deriving the Ed25519 double-scalar-multiply check by hand the way
//! `ed25519_extra.c`'s `ed25519_multipart_end` does. A microcontroller's own
//! `Crypto` implementation is the one that needs genuine O(1)-memory
//! streaming, and it is free to do that however its hardware accelerator
//! demands.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha512};

use fwupdate_core::traits::{Crypto, MultipartVerifier};

/// Top three bits of the signature's last byte; Ed25519 malleability check
/// mirrored from `ed25519_multipart_init`'s `signature[63] & 224`.
const MALLEABLE_SIGNATURE_MASK: u8 = 0xE0;

/// Accumulates a streamed message for one verification in progress.
pub struct DalekVerifier {
    verifying_key: VerifyingKey,
    signature: Signature,
    message: Vec<u8>,
}

impl MultipartVerifier for DalekVerifier {
    fn update(&mut self, data: &[u8]) {
        self.message.extend_from_slice(data);
    }

    fn finish(self) -> bool {
        self.verifying_key
            .verify_strict(&self.message, &self.signature)
            .is_ok()
    }
}

/// The real `Crypto` implementation: Ed25519 over `ed25519-dalek`, SHA-512
/// over `sha2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DalekCrypto;

impl Crypto for DalekCrypto {
    type Verifier = DalekVerifier;

    fn begin_verify(&self, public_key: &[u8; 32], signature: &[u8; 64]) -> Option<Self::Verifier> {
        if signature[63] & MALLEABLE_SIGNATURE_MASK != 0 {
            return None;
        }
        let verifying_key = VerifyingKey::from_bytes(public_key).ok()?;
        let signature = Signature::from_bytes(signature);
        Some(DalekVerifier {
            verifying_key,
            signature,
            message: Vec::new(),
        })
    }

    fn verify(&self, public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
        if signature[63] & MALLEABLE_SIGNATURE_MASK != 0 {
            return false;
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let signature = Signature::from_bytes(signature);
        verifying_key.verify(message, &signature).is_ok()
    }

    fn sha512(&self, message: &[u8]) -> [u8; 64] {
        let mut hasher = Sha512::new();
        hasher.update(message);
        hasher.finalize().into()
    }

    fn sign(&self, secret_key: &[u8; 32], message: &[u8]) -> [u8; 64] {
        let signing_key = SigningKey::from_bytes(secret_key);
        signing_key.sign(message).to_bytes()
    }
}
