//! OpenSSH Ed25519 private-key file parsing and generation.
//!
//! Grounded in `hexsign/openSSH_key.cpp`: the same binary layout is walked
//! here (magic, cipher/KDF names, one public-key blob, one length-prefixed
//! private-key block holding a duplicated checkint, the key type string,
//! the public key again, and the 64-byte `seed || public_key` private key
//! blob) but through a length-checked cursor instead of raw pointer
//! arithmetic, and the PEM envelope itself is peeled off with the `pem`
//! crate rather than a hand-rolled `BEGIN`/`END` line scan.

use ed25519_dalek::{Signer, SigningKey};
use pem::Pem;

use crate::error::KeyFileError;

const OPENSSH_MAGIC: &[u8] = b"openssh-key-v1\0";
const PEM_TAG: &str = "OPENSSH PRIVATE KEY";
const KEY_TYPE: &[u8] = b"ssh-ed25519";

/// A parsed Ed25519 keypair: the 32-byte seed and its corresponding public key.
#[derive(Debug, Clone, Copy)]
pub struct KeyPair {
    pub public_key: [u8; 32],
    pub secret_key: [u8; 32],
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], KeyFileError> {
        if self.pos + n > self.data.len() {
            return Err(KeyFileError::Truncated);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u32(&mut self) -> Result<u32, KeyFileError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn take_string(&mut self) -> Result<&'a [u8], KeyFileError> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }
}

impl KeyPair {
    /// Parses an OpenSSH-format Ed25519 private key file (unencrypted only)
    /// and runs [`Self::verify`] on the result before returning it.
    pub fn from_pem(text: &str) -> Result<Self, KeyFileError> {
        let pem = pem::parse(text).map_err(|err| KeyFileError::Pem(err.to_string()))?;
        if pem.tag() != PEM_TAG {
            return Err(KeyFileError::Pem(format!("unexpected PEM tag {:?}", pem.tag())));
        }

        let mut cursor = Cursor::new(pem.contents());

        let magic = cursor.take(OPENSSH_MAGIC.len())?;
        if magic != OPENSSH_MAGIC {
            return Err(KeyFileError::BadMagic);
        }

        let cipher_name = cursor.take_string()?;
        if cipher_name != b"none" {
            return Err(KeyFileError::UnsupportedCipher(
                String::from_utf8_lossy(cipher_name).into_owned(),
            ));
        }
        let _kdf_name = cursor.take_string()?;
        let _kdf_options = cursor.take_string()?;

        let key_count = cursor.take_u32()?;
        if key_count != 1 {
            return Err(KeyFileError::UnexpectedKeyCount(key_count));
        }

        let mut pubkey_blob = Cursor::new(cursor.take_string()?);
        let outer_key_type = pubkey_blob.take_string()?;
        if outer_key_type != KEY_TYPE {
            return Err(KeyFileError::UnsupportedKeyType(
                String::from_utf8_lossy(outer_key_type).into_owned(),
            ));
        }
        let outer_public = pubkey_blob.take_string()?;
        if outer_public.len() != 32 {
            return Err(KeyFileError::Truncated);
        }

        let private_block = cursor.take_string()?;
        let mut block = Cursor::new(private_block);

        let _checkint1 = block.take_u32()?;
        let _checkint2 = block.take_u32()?;

        let inner_key_type = block.take_string()?;
        if inner_key_type != KEY_TYPE {
            return Err(KeyFileError::UnsupportedKeyType(
                String::from_utf8_lossy(inner_key_type).into_owned(),
            ));
        }
        let inner_public = block.take_string()?;
        if inner_public != outer_public {
            return Err(KeyFileError::KeyMismatch);
        }
        let private_blob = block.take_string()?;
        if private_blob.len() != 64 {
            return Err(KeyFileError::Truncated);
        }
        let _comment = block.take_string()?;

        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(outer_public);
        let mut secret_key = [0u8; 32];
        secret_key.copy_from_slice(&private_blob[..32]);

        let keypair = KeyPair { public_key, secret_key };
        if !keypair.verify() {
            return Err(KeyFileError::KeyMismatch);
        }
        Ok(keypair)
    }

    /// Sanity check mirroring `VerifyKeys` in both `updateclient.cpp` and
    /// `hexsign.cpp`: the public key derived from the seed must match the
    /// one stored alongside it, and a throwaway sign/verify round trip must
    /// succeed.
    pub fn verify(&self) -> bool {
        let signing_key = SigningKey::from_bytes(&self.secret_key);
        if signing_key.verifying_key().to_bytes() != self.public_key {
            return false;
        }

        let message = b"Test message to verify asymmetric keys";
        let signature = signing_key.sign(message);
        signing_key.verifying_key().verify_strict(message, &signature).is_ok()
    }

    /// Generates a fresh keypair from OS randomness.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        KeyPair {
            public_key: signing_key.verifying_key().to_bytes(),
            secret_key: signing_key.to_bytes(),
        }
    }

    /// Encodes this keypair as an unencrypted OpenSSH private key file,
    /// the inverse of [`Self::from_pem`].
    pub fn to_pem(&self, comment: &str) -> String {
        let mut pubkey_blob = Vec::new();
        write_string(&mut pubkey_blob, KEY_TYPE);
        write_string(&mut pubkey_blob, &self.public_key);

        let signing_key = SigningKey::from_bytes(&self.secret_key);
        let private_blob: Vec<u8> = self
            .secret_key
            .iter()
            .chain(signing_key.verifying_key().to_bytes().iter())
            .copied()
            .collect();

        let mut private_section = Vec::new();
        let checkint = 0x5a5a_5a5au32; // arbitrary, both copies just need to match
        private_section.extend_from_slice(&checkint.to_be_bytes());
        private_section.extend_from_slice(&checkint.to_be_bytes());
        write_string(&mut private_section, KEY_TYPE);
        write_string(&mut private_section, &self.public_key);
        write_string(&mut private_section, &private_blob);
        write_string(&mut private_section, comment.as_bytes());

        let mut pad = 1u8;
        while private_section.len() % 8 != 0 {
            private_section.push(pad);
            pad += 1;
        }

        let mut contents = Vec::new();
        contents.extend_from_slice(OPENSSH_MAGIC);
        write_string(&mut contents, b"none"); // cipher
        write_string(&mut contents, b"none"); // kdf
        write_string(&mut contents, b""); // kdf options
        contents.extend_from_slice(&1u32.to_be_bytes());
        write_string(&mut contents, &pubkey_blob);
        write_string(&mut contents, &private_section);

        pem::encode(&Pem::new(PEM_TAG, contents))
    }
}

fn write_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}
