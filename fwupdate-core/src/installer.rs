//! Verifies a complete firmware image by streaming its fragments, in order,
//! through a multi-part Ed25519 verification and, independently, through the
//! per-fragment hash chain a hash-chain-signed image carries.
//!
//! Grounded in the original's `ed25519_multipart_*` usage pattern (see
//! `ed25519/extra/ed25519_extra.c`) combined with the fragment-gap/overlap
//! bookkeeping the distilled spec calls for, and in `updateclient.cpp`'s
//! `AddHashChain` for the hash-chain half (§3.2/glossary: each fragment's
//! `sha512` is `sha512(link ∥ fragment_bytes_excluding_sha512)`, seeded at
//! fragment 0 with `metadata.metadata_signature`). Parameterised over a
//! fragment *source* so the same function serves both the host "test
//! server" (iterating an in-memory `Vec<Fragment>`) and a device installer
//! (iterating `FragmentArea::read_fragment` calls) — one implementation
//! instead of the two the original's test server and device build each
//! carry separately.

use crate::codec::{Fragment, Metadata, VerifyMethod, FRAGMENT_SIZE};
use crate::error::CoreError;
use crate::traits::{Crypto, MultipartVerifier};

/// Streams `fragments` (ascending `number`, starting at `0`) through a
/// multi-part Ed25519 verification against `metadata.firmware_signature`,
/// and checks each hash-chain fragment's (`verify_method = 1`) `sha512`
/// link as it goes.
///
/// `first_flash_address` is the address fragment 0 must begin at — the base
/// of the flash region the fragments collectively tile, which need not equal
/// `metadata.start_address` (the firmware's entry point can sit after a
/// bootloader or other region the fragment chain also covers). Fragments are
/// required to tile that region with no gap or overlap; only the sub-range
/// `[metadata.start_address, metadata.start_address + metadata.firmware_size)`
/// is actually hashed into the firmware-wide signature — the hash chain, by
/// contrast, covers every fragment's full encoded bytes (minus `sha512`
/// itself) regardless of how much of `content` is "used" by `size`.
///
/// Returns `Ok(false)` for a verification failure (bad firmware-wide
/// signature, a signature whose top scalar byte trips the malleability
/// check, or a broken hash-chain link) and `Err(CoreError::Invalid)` for a
/// structural problem with the fragment sequence itself (wrong
/// `firmware_id`, wrong `number`, a gap or overlap against the previous
/// fragment's placement) — the caller gets to tell "this chain doesn't even
/// describe one image" apart from "this image doesn't check out".
pub fn verify_fragment_chain<I, C>(
    metadata: &Metadata,
    first_flash_address: u32,
    fragments: I,
    crypto: &C,
    public_key: &[u8; 32],
) -> Result<bool, CoreError>
where
    I: Iterator<Item = Result<Fragment, CoreError>>,
    C: Crypto,
{
    let Some(mut verifier) = crypto.begin_verify(public_key, &metadata.firmware_signature) else {
        return Ok(false);
    };

    let region_start = metadata.start_address;
    let region_end = region_start
        .checked_add(metadata.firmware_size)
        .ok_or(CoreError::Invalid)?;

    // A virtual zero-size predecessor at the flash region's base address, so
    // fragment 0 is required to begin exactly there — not necessarily at
    // `metadata.start_address`.
    let mut prev_end = first_flash_address;
    let mut chain_link = metadata.metadata_signature;

    for (expected_number, fragment) in fragments.enumerate() {
        let fragment = fragment?;

        if fragment.number != expected_number as u32 {
            return Err(CoreError::Invalid);
        }
        if fragment.firmware_id != metadata.firmware_id {
            return Err(CoreError::Invalid);
        }
        if fragment.start_address != prev_end {
            return Err(CoreError::Invalid);
        }

        if fragment.verify_method() == Some(VerifyMethod::HashChain) {
            let encoded = fragment.encode();
            let chained = Fragment::method1_chained_range(&encoded);

            let mut message = [0u8; FRAGMENT_SIZE];
            message[..64].copy_from_slice(&chain_link);
            message[64..].copy_from_slice(chained);

            let digest = crypto.sha512(&message);
            if digest != fragment.sha512 {
                return Ok(false);
            }
            chain_link = digest;
        }

        let fragment_end = fragment
            .start_address
            .checked_add(fragment.size)
            .ok_or(CoreError::Invalid)?;

        let overlap_start = fragment.start_address.max(region_start);
        let overlap_end = fragment_end.min(region_end);
        if overlap_end > overlap_start {
            let skip = (overlap_start - fragment.start_address) as usize;
            let len = (overlap_end - overlap_start) as usize;
            verifier.update(&fragment.content[skip..skip + len]);
        }

        prev_end = fragment_end;
    }

    Ok(verifier.finish())
}
