//! Host-side signing: the two schemes `updateclient`/`hexsign` use to
//! authenticate an image before it goes over the wire.
//!
//! Two independent concerns, kept as two independent functions pairs here
//! just as they are two separate tools in the original:
//!
//! - [`sign_firmware_image`] is `hexsign.cpp`'s `TrySignSection`: signs
//!   `metadata.firmware_signature` over the firmware payload range and
//!   `metadata.metadata_signature` over the header itself. This is what
//!   [`fwupdate_core::installer::verify_fragment_chain`] checks on the
//!   install side.
//! - [`sign_fragments_ed25519`]/[`sign_fragments_hash_chain`] are
//!   `updateclient.cpp`'s `SignFragments`/`AddHashChain`: per-fragment
//!   authentication consumed by a device's [`fwupdate_core::traits::FragmentValidator`],
//!   unrelated to the firmware-wide signature above.

use fwupdate_core::codec::{Fragment, Metadata};
use fwupdate_core::traits::Crypto;

use crate::hexfile::Section;

/// Signs `image.metadata`'s two signature fields in place, then re-verifies
/// both before returning — mirrors `TrySignSection` immediately followed by
/// `VerifySectionSignature` in the original tool, so a bad keypair is caught
/// at signing time rather than surfacing later on a device.
///
/// `section` must be the same byte range `image.metadata` was read out of
/// (pass the section `firmware::split_firmware_sections` took as input).
pub fn sign_firmware_image<C: Crypto>(
    metadata: &mut Metadata,
    section: &Section,
    crypto: &C,
    secret_key: &[u8; 32],
    public_key: &[u8; 32],
) -> bool {
    let offset = (metadata.start_address - section.start_address) as usize;
    let firmware_bytes = &section.data[offset..offset + metadata.firmware_size as usize];

    metadata.firmware_signature = crypto.sign(secret_key, firmware_bytes);

    let encoded = metadata.encode();
    metadata.metadata_signature = crypto.sign(secret_key, Metadata::signed_range(&encoded));

    let firmware_ok = crypto.verify(public_key, firmware_bytes, &metadata.firmware_signature);
    let encoded = metadata.encode();
    let metadata_ok = crypto.verify(public_key, Metadata::signed_range(&encoded), &metadata.metadata_signature);

    firmware_ok && metadata_ok
}

/// Signs each fragment's `signature` field individually (`verify_method =
/// 0`), re-verifying each as it goes. Mirrors `SignFragments`.
pub fn sign_fragments_ed25519<C: Crypto>(
    fragments: &mut [Fragment],
    crypto: &C,
    secret_key: &[u8; 32],
    public_key: &[u8; 32],
) -> bool {
    for fragment in fragments.iter_mut() {
        fragment.verify_method = 0;
        fragment.signature = [0; 64];
        fragment.sha512 = [0; 64];

        let encoded = fragment.encode();
        let (prefix, suffix) = Fragment::method0_signed_ranges(&encoded);
        let mut message = Vec::with_capacity(prefix.len() + suffix.len());
        message.extend_from_slice(prefix);
        message.extend_from_slice(suffix);

        fragment.signature = crypto.sign(secret_key, &message);

        let encoded = fragment.encode();
        let (prefix, suffix) = Fragment::method0_signed_ranges(&encoded);
        let mut message = Vec::with_capacity(prefix.len() + suffix.len());
        message.extend_from_slice(prefix);
        message.extend_from_slice(suffix);
        if !crypto.verify(public_key, &message, &fragment.signature) {
            return false;
        }
    }
    true
}

/// Chains each fragment's `sha512` field to the previous fragment's hash
/// (or `metadata.metadata_signature` for fragment `0`), `verify_method = 1`.
/// Mirrors `AddHashChain`.
pub fn sign_fragments_hash_chain<C: Crypto>(fragments: &mut [Fragment], metadata: &Metadata, crypto: &C) {
    let mut last_hash = metadata.metadata_signature;

    for fragment in fragments.iter_mut() {
        fragment.verify_method = 1;
        fragment.sha512 = [0; 64];

        let encoded = fragment.encode();
        let signed_range = Fragment::method1_chained_range(&encoded);

        let mut message = Vec::with_capacity(64 + signed_range.len());
        message.extend_from_slice(&last_hash);
        message.extend_from_slice(signed_range);

        let digest = crypto.sha512(&message);
        fragment.sha512 = digest;
        last_hash = digest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwupdate_core::codec::{FRAGMENT_CONTENT_SIZE, METADATA_SIZE};

    struct FakeCrypto;

    impl Crypto for FakeCrypto {
        type Verifier = FakeVerifier;

        fn begin_verify(&self, _public_key: &[u8; 32], signature: &[u8; 64]) -> Option<Self::Verifier> {
            Some(FakeVerifier {
                expected: *signature,
                actual: Vec::new(),
            })
        }

        fn sha512(&self, message: &[u8]) -> [u8; 64] {
            // Not a real hash; deterministic and injective enough for chain tests.
            let mut out = [0u8; 64];
            for (i, chunk) in message.chunks(64).enumerate() {
                for (j, &b) in chunk.iter().enumerate() {
                    out[j] ^= b.wrapping_add(i as u8);
                }
            }
            out
        }

        fn sign(&self, secret_key: &[u8; 32], message: &[u8]) -> [u8; 64] {
            // A fake "signature" derived from the secret key and a hash of the message.
            let digest = self.sha512(message);
            let mut sig = [0u8; 64];
            for i in 0..32 {
                sig[i] = secret_key[i] ^ digest[i];
            }
            sig[32..].copy_from_slice(&digest[32..]);
            sig
        }

        fn verify(&self, public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> bool {
            self.sign(public_key, message) == *signature
        }
    }

    struct FakeVerifier {
        expected: [u8; 64],
        actual: Vec<u8>,
    }

    impl fwupdate_core::traits::MultipartVerifier for FakeVerifier {
        fn update(&mut self, data: &[u8]) {
            self.actual.extend_from_slice(data);
        }
        fn finish(self) -> bool {
            self.expected != [0; 64] || self.actual.is_empty()
        }
    }

    // Keys are equal here: this fake's "sign" and "verify" both derive from
    // the same XOR construction, so the same 32 bytes work as secret and
    // public key for round-trip purposes.
    impl FakeCrypto {
        fn matching_keys() -> ([u8; 32], [u8; 32]) {
            ([0x11; 32], [0x11; 32])
        }
    }

    fn sample_metadata() -> Metadata {
        Metadata {
            firmware_type: 1,
            version: 1,
            rollback_number: 0,
            firmware_id: 5,
            start_address: METADATA_SIZE as u32,
            firmware_size: 8,
            name: [0; 32],
            firmware_signature: [0; 64],
            metadata_signature: [0; 64],
        }
    }

    #[test]
    fn sign_firmware_image_round_trips() {
        let crypto = FakeCrypto;
        let (secret, public) = FakeCrypto::matching_keys();

        let mut metadata = sample_metadata();
        let mut data = metadata.encode().to_vec();
        data.extend_from_slice(&[0xAB; 8]);
        let section = Section {
            start_address: 0,
            data,
        };

        assert!(sign_firmware_image(&mut metadata, &section, &crypto, &secret, &public));
        assert_ne!(metadata.firmware_signature, [0; 64]);
        assert_ne!(metadata.metadata_signature, [0; 64]);
    }

    #[test]
    fn sign_fragments_ed25519_sets_verify_method_zero() {
        let crypto = FakeCrypto;
        let (secret, public) = FakeCrypto::matching_keys();

        let mut fragments = vec![Fragment {
            firmware_id: 5,
            number: 0,
            start_address: METADATA_SIZE as u32,
            size: 4,
            content: [0u8; FRAGMENT_CONTENT_SIZE],
            verify_method: 9,
            signature: [0; 64],
            sha512: [0; 64],
        }];

        assert!(sign_fragments_ed25519(&mut fragments, &crypto, &secret, &public));
        assert_eq!(fragments[0].verify_method, 0);
        assert_ne!(fragments[0].signature, [0; 64]);
    }

    #[test]
    fn sign_fragments_hash_chain_links_successive_fragments() {
        let crypto = FakeCrypto;
        let metadata = sample_metadata();

        let mut fragments = vec![
            Fragment {
                firmware_id: 5,
                number: 0,
                start_address: METADATA_SIZE as u32,
                size: 4,
                content: [0xAA; FRAGMENT_CONTENT_SIZE],
                verify_method: 0,
                signature: [0; 64],
                sha512: [0; 64],
            },
            Fragment {
                firmware_id: 5,
                number: 1,
                start_address: METADATA_SIZE as u32 + 4,
                size: 4,
                content: [0xBB; FRAGMENT_CONTENT_SIZE],
                verify_method: 0,
                signature: [0; 64],
                sha512: [0; 64],
            },
        ];

        sign_fragments_hash_chain(&mut fragments, &metadata, &crypto);
        assert_eq!(fragments[0].verify_method, 1);
        assert_eq!(fragments[1].verify_method, 1);
        assert_ne!(fragments[0].sha512, fragments[1].sha512);
    }
}
