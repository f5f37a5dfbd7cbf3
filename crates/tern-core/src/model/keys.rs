//! Identity values: the 32-byte public key and the 38-byte Tox ID.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeyParseError;

/// Size of a public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;
/// Size of the anti-spam value appended to a public key in a Tox ID.
pub const NOSPAM_SIZE: usize = 4;
/// Size of the Tox ID checksum.
pub const CHECKSUM_SIZE: usize = 2;
/// Size of a full Tox ID in bytes.
pub const TOX_ID_SIZE: usize = PUBLIC_KEY_SIZE + NOSPAM_SIZE + CHECKSUM_SIZE;

/// Long-term public key identifying a peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Uppercase hex form used for storage keys and display.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse the 64-character hex form.
    ///
    /// # Errors
    ///
    /// Returns an error if the input has the wrong length or is not hex.
    pub fn parse(value: &str) -> Result<Self, KeyParseError> {
        let bytes = decode_fixed::<PUBLIC_KEY_SIZE>(value)?;
        Ok(Self(bytes))
    }
}

impl FromStr for PublicKey {
    type Err = KeyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for PublicKey {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PublicKey> for String {
    fn from(key: PublicKey) -> Self {
        key.to_hex()
    }
}

impl Display for PublicKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_hex())
    }
}

impl Debug for PublicKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(formatter, "PublicKey({}…)", &hex[..8])
    }
}

/// Shareable address: public key, nospam and checksum.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToxId([u8; TOX_ID_SIZE]);

impl ToxId {
    /// Build an address for `public_key` with the given anti-spam value.
    #[must_use]
    pub fn new(public_key: PublicKey, nospam: u32) -> Self {
        let mut bytes = [0_u8; TOX_ID_SIZE];
        bytes[..PUBLIC_KEY_SIZE].copy_from_slice(public_key.as_bytes());
        bytes[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + NOSPAM_SIZE].copy_from_slice(&nospam.to_be_bytes());
        let checksum = checksum(&bytes[..PUBLIC_KEY_SIZE + NOSPAM_SIZE]);
        bytes[PUBLIC_KEY_SIZE + NOSPAM_SIZE..].copy_from_slice(&checksum);
        Self(bytes)
    }

    /// Public key portion of the address.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let mut key = [0_u8; PUBLIC_KEY_SIZE];
        key.copy_from_slice(&self.0[..PUBLIC_KEY_SIZE]);
        PublicKey(key)
    }

    /// Anti-spam value.
    #[must_use]
    pub fn nospam(&self) -> u32 {
        let mut nospam = [0_u8; NOSPAM_SIZE];
        nospam.copy_from_slice(&self.0[PUBLIC_KEY_SIZE..PUBLIC_KEY_SIZE + NOSPAM_SIZE]);
        u32::from_be_bytes(nospam)
    }

    /// Raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TOX_ID_SIZE] {
        &self.0
    }

    /// Uppercase hex form.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse the 76-character hex form, verifying the checksum.
    ///
    /// # Errors
    ///
    /// Returns an error on bad length, bad hex, or checksum mismatch.
    pub fn parse(value: &str) -> Result<Self, KeyParseError> {
        let bytes = decode_fixed::<TOX_ID_SIZE>(value)?;
        let expected = checksum(&bytes[..PUBLIC_KEY_SIZE + NOSPAM_SIZE]);
        if bytes[PUBLIC_KEY_SIZE + NOSPAM_SIZE..] != expected {
            return Err(KeyParseError::ChecksumMismatch);
        }
        Ok(Self(bytes))
    }
}

impl FromStr for ToxId {
    type Err = KeyParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for ToxId {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ToxId> for String {
    fn from(id: ToxId) -> Self {
        id.to_hex()
    }
}

impl Display for ToxId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_hex())
    }
}

impl Debug for ToxId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(formatter, "ToxId({}…)", &hex[..8])
    }
}

fn checksum(bytes: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut sum = [0_u8; CHECKSUM_SIZE];
    for (index, byte) in bytes.iter().enumerate() {
        sum[index % CHECKSUM_SIZE] ^= byte;
    }
    sum
}

fn decode_fixed<const N: usize>(value: &str) -> Result<[u8; N], KeyParseError> {
    let value = value.trim();
    if value.len() != N * 2 {
        return Err(KeyParseError::InvalidLength {
            expected: N * 2,
            actual: value.len(),
        });
    }
    let mut bytes = [0_u8; N];
    hex::decode_to_slice(value, &mut bytes).map_err(|_| KeyParseError::InvalidHex)?;
    Ok(bytes)
}
