//! JSON profile written by the stub engine.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tern_core::{ContactInfo, EngineStartError, PUBLIC_KEY_SIZE, PublicKey, UserStatus};
use tracing::error;

use crate::store::is_encrypted;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StubProfile {
    pub(crate) public_key: PublicKey,
    pub(crate) nospam: u32,
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) status_message: String,
    #[serde(default)]
    pub(crate) status: UserStatus,
    #[serde(default)]
    pub(crate) contacts: Vec<ContactInfo>,
}

impl StubProfile {
    /// Fresh identity with a random key and nospam.
    pub(crate) fn generate() -> Self {
        let mut rng = rand::rng();
        let mut key = [0_u8; PUBLIC_KEY_SIZE];
        rng.fill(&mut key);
        Self {
            public_key: PublicKey::from_bytes(key),
            nospam: rng.random(),
            name: String::new(),
            status_message: String::new(),
            status: UserStatus::None,
            contacts: Vec::new(),
        }
    }

    pub(crate) fn decode(blob: &[u8]) -> Result<Self, EngineStartError> {
        if is_encrypted(blob) {
            return Err(EngineStartError::Encrypted);
        }
        serde_json::from_slice(blob).map_err(|source| EngineStartError::BadFormat {
            reason: source.to_string(),
        })
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|source| {
            // Only string keys and plain values; serialization cannot fail.
            error!(error = %source, "failed to encode stub profile");
            Vec::new()
        })
    }

    pub(crate) fn contact(&self, public_key: &PublicKey) -> Option<&ContactInfo> {
        self.contacts
            .iter()
            .find(|contact| contact.public_key == *public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_survives_encoding() {
        let mut profile = StubProfile::generate();
        profile.name = "alice".into();
        profile.contacts.push(ContactInfo {
            public_key: PublicKey::from_bytes([7; 32]),
            name: "bob".into(),
            status_message: String::new(),
            status: UserStatus::Away,
        });

        let decoded = StubProfile::decode(&profile.encode()).expect("decode");
        assert_eq!(decoded, profile);
        assert!(decoded.contact(&PublicKey::from_bytes([7; 32])).is_some());
    }

    #[test]
    fn rejects_encrypted_and_garbage_blobs() {
        let mut encrypted = crate::store::ENCRYPTED_MAGIC.to_vec();
        encrypted.extend_from_slice(b"opaque");
        assert_eq!(
            StubProfile::decode(&encrypted),
            Err(EngineStartError::Encrypted)
        );
        assert!(matches!(
            StubProfile::decode(b"not json"),
            Err(EngineStartError::BadFormat { .. })
        ));
    }
}
