//! Passphrase encryption for save blobs.
//!
//! Layout: `MAGIC | salt (16) | nonce (12) | ciphertext+tag`. The key is
//! derived with Argon2id; deriving is slow, so the key for this cipher's own
//! salt is computed once and reused for every save.

use std::fmt::{self, Debug, Formatter};

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::Rng;
use tern_core::PersistenceError;

/// Prefix identifying an encrypted blob.
pub const ENCRYPTED_MAGIC: &[u8; 8] = b"TERNSAV1";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = ENCRYPTED_MAGIC.len() + SALT_LEN + NONCE_LEN;

/// Whether `blob` carries the encrypted header.
#[must_use]
pub fn is_encrypted(blob: &[u8]) -> bool {
    blob.starts_with(ENCRYPTED_MAGIC)
}

/// Symmetric cipher keyed by a user passphrase.
#[derive(Clone)]
pub struct SaveCipher {
    passphrase: String,
    params: Params,
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

impl SaveCipher {
    /// Derive a cipher for `passphrase` with a fresh random salt.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::KeyDerivation`] if Argon2 rejects the input.
    pub fn new(passphrase: impl Into<String>) -> Result<Self, PersistenceError> {
        Self::with_params(passphrase, Params::default())
    }

    /// Derive a cipher with explicit Argon2 cost parameters.
    ///
    /// Readers must use the same parameters as the writer.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::KeyDerivation`] if Argon2 rejects the input.
    pub fn with_params(
        passphrase: impl Into<String>,
        params: Params,
    ) -> Result<Self, PersistenceError> {
        let passphrase = passphrase.into();
        let mut salt = [0_u8; SALT_LEN];
        rand::rng().fill(&mut salt);
        let key = derive_key(&params, &passphrase, &salt)?;
        Ok(Self {
            passphrase,
            params,
            salt,
            key,
        })
    }

    /// Encrypt `plaintext` under a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Encrypt`] if the AEAD fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, PersistenceError> {
        let mut nonce = [0_u8; NONCE_LEN];
        rand::rng().fill(&mut nonce);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| PersistenceError::Encrypt)?;

        let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        blob.extend_from_slice(ENCRYPTED_MAGIC);
        blob.extend_from_slice(&self.salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by any cipher sharing this passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Decrypt`] on a truncated blob, a wrong
    /// passphrase, or tampered data.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, PersistenceError> {
        if blob.len() < HEADER_LEN || !is_encrypted(blob) {
            return Err(PersistenceError::Decrypt);
        }
        let (salt, rest) = blob[ENCRYPTED_MAGIC.len()..].split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let key = if salt == self.salt {
            self.key
        } else {
            derive_key(&self.params, &self.passphrase, salt)?
        };
        ChaCha20Poly1305::new(Key::from_slice(&key))
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| PersistenceError::Decrypt)
    }
}

impl Debug for SaveCipher {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SaveCipher")
            .field("passphrase", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn derive_key(
    params: &Params,
    passphrase: &str,
    salt: &[u8],
) -> Result<[u8; KEY_LEN], PersistenceError> {
    let mut key = [0_u8; KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|error| PersistenceError::KeyDerivation {
            reason: error.to_string(),
        })?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_params() -> Params {
        Params::new(256, 1, 1, Some(KEY_LEN)).expect("valid params")
    }

    fn cipher(passphrase: &str) -> SaveCipher {
        SaveCipher::with_params(passphrase, cheap_params()).expect("cipher")
    }

    #[test]
    fn round_trip_with_same_cipher() {
        let cipher = cipher("hunter2");
        let blob = cipher.encrypt(b"profile").expect("encrypt");
        assert!(is_encrypted(&blob));
        assert_eq!(cipher.decrypt(&blob).expect("decrypt"), b"profile");
    }

    #[test]
    fn second_cipher_with_same_passphrase_decrypts() {
        let writer = cipher("hunter2");
        let reader = cipher("hunter2");
        let blob = writer.encrypt(b"profile").expect("encrypt");
        assert_eq!(reader.decrypt(&blob).expect("decrypt"), b"profile");
    }

    #[test]
    fn wrong_passphrase_or_tampering_fails() {
        let writer = cipher("hunter2");
        let mut blob = writer.encrypt(b"profile").expect("encrypt");

        let other = cipher("letmein");
        assert!(matches!(other.decrypt(&blob), Err(PersistenceError::Decrypt)));

        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(matches!(writer.decrypt(&blob), Err(PersistenceError::Decrypt)));
        assert!(matches!(
            writer.decrypt(&blob[..10]),
            Err(PersistenceError::Decrypt)
        ));
    }

    #[test]
    fn debug_redacts_passphrase() {
        let cipher = cipher("hunter2");
        assert!(!format!("{cipher:?}").contains("hunter2"));
    }
}
