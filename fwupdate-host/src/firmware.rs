//! Splits one HEX section into a [`Metadata`] header and the [`Fragment`]
//! chain that follows it, and the reverse: flattening a firmware image back
//! into a HEX section after it has been signed.
//!
//! Grounded in `updateclient/updateclient.cpp`'s `MakeFirmwareSections` and
//! `hexsign/hexsign.cpp`'s `CheckMetadataMem`/`TrySignSection`: the metadata
//! record sits at the very start of the section, `metadata.start_address`
//! names where the firmware payload begins (not necessarily right after the
//! header — `hexsign` only requires it fall somewhere inside the section),
//! and fragments tile everything from the byte after the metadata header to
//! the end of the section, each holding up to
//! [`fwupdate_core::codec::FRAGMENT_CONTENT_SIZE`] bytes.

use fwupdate_core::codec::{FRAGMENT_CONTENT_SIZE, METADATA_SIZE};
use fwupdate_core::{Fragment, Metadata};

use crate::error::FirmwareError;
use crate::hexfile::Section;

/// A firmware image split into its signed header and its fragment chain.
pub struct FirmwareImage {
    pub metadata: Metadata,
    pub fragments: Vec<Fragment>,
    /// The address fragment `0` begins at — `section.start_address +
    /// METADATA_SIZE`. Passed to [`fwupdate_core::installer::verify_fragment_chain`]
    /// as its `first_flash_address`.
    pub first_flash_address: u32,
}

/// Splits `section` into a metadata header and the fragments following it.
/// Fragments are unsigned (`verify_method = 0`, `signature`/`sha512` all
/// zero) — [`crate::sign`] fills those in afterward.
pub fn split_firmware_sections(section: &Section) -> Result<FirmwareImage, FirmwareError> {
    if section.data.len() < METADATA_SIZE {
        return Err(FirmwareError::TooShortForMetadata);
    }

    let metadata = Metadata::decode(&section.data[..METADATA_SIZE])
        .map_err(FirmwareError::MetadataDecode)?;

    let first_flash_address = section
        .start_address
        .checked_add(METADATA_SIZE as u32)
        .ok_or(FirmwareError::StartAddressOutOfSection)?;
    let section_end = section.start_address + section.data.len() as u32;
    if metadata.start_address < first_flash_address || metadata.start_address >= section_end {
        return Err(FirmwareError::StartAddressOutOfSection);
    }

    let mut fragments = Vec::new();
    let mut pos = METADATA_SIZE;
    let mut number = 0u32;
    while pos < section.data.len() {
        let remaining = section.data.len() - pos;
        let take = remaining.min(FRAGMENT_CONTENT_SIZE);

        let mut content = [0u8; FRAGMENT_CONTENT_SIZE];
        content[..take].copy_from_slice(&section.data[pos..pos + take]);

        fragments.push(Fragment {
            firmware_id: metadata.firmware_id,
            number,
            start_address: section.start_address + pos as u32,
            size: take as u32,
            content,
            verify_method: 0,
            signature: [0; 64],
            sha512: [0; 64],
        });

        pos += take;
        number += 1;
    }

    Ok(FirmwareImage {
        metadata,
        fragments,
        first_flash_address,
    })
}

/// Flattens `image` back into one HEX section, ready for
/// [`crate::hexfile::HexFile::to_writer`].
pub fn to_section(image: &FirmwareImage, start_address: u32) -> Section {
    let mut data = Vec::with_capacity(METADATA_SIZE + image.fragments.len() * FRAGMENT_CONTENT_SIZE);
    data.extend_from_slice(&image.metadata.encode());
    for fragment in &image.fragments {
        data.extend_from_slice(&fragment.content[..fragment.size as usize]);
    }
    Section { start_address, data }
}
