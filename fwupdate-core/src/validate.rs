//! Concrete, cryptographically-backed implementations of the validator
//! traits in [`crate::traits`].
//!
//! Grounded in `fragmentstore_test.cpp`'s `TestValidateFragment`/
//! `TestValidateMetadata` (Ed25519-verify a record's bytes, minus its own
//! signature field, against a fixed public key) and in the hash-chain
//! definition used by `updateclient.cpp`'s `AddHashChain`: each fragment's
//! `sha512` chains SHA-512 of the previous link concatenated with the
//! fragment's own bytes (minus `sha512` itself), seeded at fragment 0 with
//! the owning metadata's `metadata_signature`.

use core::cell::RefCell;

use crate::codec::{Fragment, Metadata, VerifyMethod, FRAGMENT_SIZE};
use crate::traits::{Crypto, FragmentValidator, MetadataValidator};

/// Verifies `metadata_signature` over [`Metadata::signed_range`] against an
/// injected public key. `FragmentArea` already rejects a bad magic via
/// `Metadata::decode` before this validator ever runs; this is the other
/// half of "valid metadata" (§3.2): magic *and* signature.
pub struct SignatureMetadataValidator<'c, C> {
    crypto: &'c C,
    public_key: [u8; 32],
}

impl<'c, C: Crypto> SignatureMetadataValidator<'c, C> {
    pub fn new(crypto: &'c C, public_key: [u8; 32]) -> Self {
        Self { crypto, public_key }
    }
}

impl<'c, C: Crypto> MetadataValidator for SignatureMetadataValidator<'c, C> {
    fn validate(&self, metadata: &Metadata) -> bool {
        let encoded = metadata.encode();
        self.crypto.verify(
            &self.public_key,
            Metadata::signed_range(&encoded),
            &metadata.metadata_signature,
        )
    }
}

/// Verifies a fragment under whichever scheme its own `verify_method` names:
///
/// - method 0 (Ed25519): the fragment's `signature` verifies over
///   [`Fragment::method0_signed_ranges`] against the injected public key.
/// - method 1 (hash chain): `sha512` equals `sha512(link ∥
///   method1_chained_range)`, where `link` is the previous fragment's
///   `sha512` this validator already accepted, or the owning metadata's
///   `metadata_signature` for fragment 0.
///
/// The hash-chain half needs sequential state, so fragments must be offered
/// to [`Self::validate`] in ascending `number` order — the same order
/// `FragmentArea::write_fragment` is driven in during an upload. A rejected
/// fragment does not advance the chain.
pub struct FragmentSignatureValidator<'c, C> {
    crypto: &'c C,
    public_key: [u8; 32],
    chain_link: RefCell<[u8; 64]>,
}

impl<'c, C: Crypto> FragmentSignatureValidator<'c, C> {
    /// `metadata` seeds the hash chain with its `metadata_signature`.
    pub fn new(crypto: &'c C, public_key: [u8; 32], metadata: &Metadata) -> Self {
        Self {
            crypto,
            public_key,
            chain_link: RefCell::new(metadata.metadata_signature),
        }
    }
}

impl<'c, C: Crypto> FragmentValidator for FragmentSignatureValidator<'c, C> {
    fn validate(&self, fragment: &Fragment) -> bool {
        let encoded = fragment.encode();
        match fragment.verify_method() {
            Some(VerifyMethod::Ed25519) => {
                let (prefix, suffix) = Fragment::method0_signed_ranges(&encoded);
                match self.crypto.begin_verify(&self.public_key, &fragment.signature) {
                    Some(mut verifier) => {
                        verifier.update(prefix);
                        verifier.update(suffix);
                        verifier.finish()
                    }
                    None => false,
                }
            }
            Some(VerifyMethod::HashChain) => {
                let prev = *self.chain_link.borrow();
                let chained = Fragment::method1_chained_range(&encoded);

                let mut message = [0u8; FRAGMENT_SIZE];
                message[..64].copy_from_slice(&prev);
                message[64..].copy_from_slice(chained);

                let digest = self.crypto.sha512(&message);
                if digest == fragment.sha512 {
                    *self.chain_link.borrow_mut() = digest;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FRAGMENT_CONTENT_SIZE;
    use crate::traits::MultipartVerifier;

    /// A `Crypto` double whose `verify`/`sha512` are plain, non-cryptographic
    /// stand-ins, just enough to exercise the validator wiring above without
    /// depending on `fwupdate-crypto`.
    struct FakeCrypto;

    struct FakeVerifier {
        expected: [u8; 64],
        message: [u8; 4100],
        len: usize,
    }

    impl MultipartVerifier for FakeVerifier {
        fn update(&mut self, data: &[u8]) {
            self.message[self.len..self.len + data.len()].copy_from_slice(data);
            self.len += data.len();
        }
        fn finish(self) -> bool {
            fake_sign(&self.message[..self.len]) == self.expected
        }
    }

    impl Crypto for FakeCrypto {
        type Verifier = FakeVerifier;

        fn begin_verify(&self, _public_key: &[u8; 32], signature: &[u8; 64]) -> Option<Self::Verifier> {
            Some(FakeVerifier {
                expected: *signature,
                message: [0u8; 4100],
                len: 0,
            })
        }

        fn sha512(&self, message: &[u8]) -> [u8; 64] {
            fake_sign(message)
        }

        fn sign(&self, _secret_key: &[u8; 32], message: &[u8]) -> [u8; 64] {
            fake_sign(message)
        }
    }

    /// A deterministic, non-cryptographic stand-in for a MAC: folds the
    /// message's length and byte sum into a fixed-size digest. Good enough to
    /// tell "tampered" from "untampered" in these tests; not a real hash.
    fn fake_sign(message: &[u8]) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[0] = (message.len() % 256) as u8;
        out[1] = message.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        out
    }

    fn metadata() -> Metadata {
        Metadata {
            firmware_type: 1,
            version: 1,
            rollback_number: 0,
            firmware_id: 7,
            start_address: 0,
            firmware_size: 16,
            name: [0; 32],
            firmware_signature: [0; 64],
            metadata_signature: [0xAB; 64],
        }
    }

    fn fragment(number: u32, verify_method: u32) -> Fragment {
        Fragment {
            firmware_id: 7,
            number,
            start_address: number * 4,
            size: 4,
            content: [0x42; FRAGMENT_CONTENT_SIZE],
            verify_method,
            signature: [0; 64],
            sha512: [0; 64],
        }
    }

    #[test]
    fn metadata_validator_accepts_correctly_signed_header() {
        let crypto = FakeCrypto;
        let mut md = metadata();
        let encoded = md.encode();
        md.metadata_signature = fake_sign(Metadata::signed_range(&encoded));

        let validator = SignatureMetadataValidator::new(&crypto, [0; 32]);
        assert!(validator.validate(&md));
    }

    #[test]
    fn metadata_validator_rejects_tampered_header() {
        let crypto = FakeCrypto;
        let mut md = metadata();
        let encoded = md.encode();
        md.metadata_signature = fake_sign(Metadata::signed_range(&encoded));
        md.firmware_type = 99; // changes signed_range after the signature was computed

        let validator = SignatureMetadataValidator::new(&crypto, [0; 32]);
        assert!(!validator.validate(&md));
    }

    #[test]
    fn fragment_validator_accepts_correctly_signed_ed25519_fragment() {
        let crypto = FakeCrypto;
        let mut frag = fragment(0, 0);
        let encoded = frag.encode();
        let (prefix, suffix) = Fragment::method0_signed_ranges(&encoded);
        let mut message = [0u8; 4100];
        message[..prefix.len()].copy_from_slice(prefix);
        message[prefix.len()..prefix.len() + suffix.len()].copy_from_slice(suffix);
        frag.signature = fake_sign(&message[..prefix.len() + suffix.len()]);

        let validator = FragmentSignatureValidator::new(&crypto, [0; 32], &metadata());
        assert!(validator.validate(&frag));
    }

    #[test]
    fn fragment_validator_rejects_tampered_ed25519_fragment() {
        let crypto = FakeCrypto;
        let mut frag = fragment(0, 0);
        let encoded = frag.encode();
        let (prefix, suffix) = Fragment::method0_signed_ranges(&encoded);
        let mut message = [0u8; 4100];
        message[..prefix.len()].copy_from_slice(prefix);
        message[prefix.len()..prefix.len() + suffix.len()].copy_from_slice(suffix);
        frag.signature = fake_sign(&message[..prefix.len() + suffix.len()]);
        frag.content[0] ^= 0x01;

        let validator = FragmentSignatureValidator::new(&crypto, [0; 32], &metadata());
        assert!(!validator.validate(&frag));
    }

    #[test]
    fn fragment_validator_accepts_a_correctly_chained_hash_chain() {
        let crypto = FakeCrypto;
        let md = metadata();
        let validator = FragmentSignatureValidator::new(&crypto, [0; 32], &md);

        let mut first = fragment(0, 1);
        let encoded = first.encode();
        let mut message0 = [0u8; 4164];
        message0[..64].copy_from_slice(&md.metadata_signature);
        message0[64..].copy_from_slice(Fragment::method1_chained_range(&encoded));
        first.sha512 = fake_sign(&message0);
        assert!(validator.validate(&first));

        let mut second = fragment(1, 1);
        let encoded = second.encode();
        let mut message1 = [0u8; 4164];
        message1[..64].copy_from_slice(&first.sha512);
        message1[64..].copy_from_slice(Fragment::method1_chained_range(&encoded));
        second.sha512 = fake_sign(&message1);
        assert!(validator.validate(&second));
    }

    #[test]
    fn fragment_validator_rejects_a_broken_hash_chain_link() {
        let crypto = FakeCrypto;
        let md = metadata();
        let validator = FragmentSignatureValidator::new(&crypto, [0; 32], &md);

        let mut first = fragment(0, 1);
        first.sha512 = [0x99; 64]; // not actually chained from metadata_signature
        assert!(!validator.validate(&first));
    }
}
