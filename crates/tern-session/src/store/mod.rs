//! Save managers: atomic files on disk and an in-memory double.

mod cipher;

pub use cipher::{ENCRYPTED_MAGIC, SaveCipher, is_encrypted};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tern_core::{PersistenceError, PublicKey, SaveManager};
use tokio::fs;
use tracing::debug;

/// Extension of profile files.
pub const SAVE_EXTENSION: &str = "tox";

/// Stores one `<PUBLICKEY>.tox` file per identity, replaced atomically.
#[derive(Debug, Clone)]
pub struct FileSaveManager {
    directory: PathBuf,
    cipher: Option<SaveCipher>,
}

impl FileSaveManager {
    /// Plaintext store rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            cipher: None,
        }
    }

    /// Encrypt every blob written from now on.
    #[must_use]
    pub fn with_cipher(mut self, cipher: SaveCipher) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Directory holding the profile files.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the profile file for `identity`.
    #[must_use]
    pub fn path_for(&self, identity: &PublicKey) -> PathBuf {
        self.directory
            .join(format!("{}.{SAVE_EXTENSION}", identity.to_hex()))
    }
}

#[async_trait]
impl SaveManager for FileSaveManager {
    async fn save(&self, identity: &PublicKey, blob: &[u8]) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| PersistenceError::Io {
                operation: "save.create_dir",
                path: self.directory.clone(),
                source,
            })?;

        let encoded = match &self.cipher {
            Some(cipher) => cipher.encrypt(blob)?,
            None => blob.to_vec(),
        };

        let target = self.path_for(identity);
        let staging = target.with_extension(format!("{SAVE_EXTENSION}.tmp"));
        fs::write(&staging, &encoded)
            .await
            .map_err(|source| PersistenceError::Io {
                operation: "save.write",
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, &target)
            .await
            .map_err(|source| PersistenceError::Io {
                operation: "save.rename",
                path: target.clone(),
                source,
            })?;
        debug!(path = %target.display(), bytes = encoded.len(), "profile saved");
        Ok(())
    }

    async fn load(&self, identity: &PublicKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path_for(identity);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    operation: "save.read",
                    path,
                    source,
                });
            }
        };

        if !is_encrypted(&raw) {
            return Ok(Some(raw));
        }
        match &self.cipher {
            Some(cipher) => cipher.decrypt(&raw).map(Some),
            None => Err(PersistenceError::Encrypted),
        }
    }

    async fn list(&self) -> Result<Vec<PublicKey>, PersistenceError> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Io {
                    operation: "save.list",
                    path: self.directory.clone(),
                    source,
                });
            }
        };

        let mut identities = Vec::new();
        loop {
            let entry = entries
                .next_entry()
                .await
                .map_err(|source| PersistenceError::Io {
                    operation: "save.list",
                    path: self.directory.clone(),
                    source,
                })?;
            let Some(entry) = entry else { break };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SAVE_EXTENSION) {
                continue;
            }
            if let Some(identity) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| PublicKey::parse(stem).ok())
            {
                identities.push(identity);
            }
        }
        identities.sort();
        Ok(identities)
    }
}

/// In-memory save manager that counts writes and can be told to fail.
#[derive(Debug, Clone, Default)]
pub struct MemorySaveManager {
    blobs: Arc<Mutex<HashMap<PublicKey, Vec<u8>>>>,
    saves: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl MemorySaveManager {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful saves so far, across identities.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make the next `count` saves fail.
    pub fn fail_next_saves(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Pre-populate a blob, as if saved by an earlier run.
    ///
    /// # Panics
    ///
    /// Panics if the blob map mutex has been poisoned.
    pub fn insert(&self, identity: PublicKey, blob: Vec<u8>) {
        self.blobs
            .lock()
            .expect("save map mutex poisoned")
            .insert(identity, blob);
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SaveManager for MemorySaveManager {
    async fn save(&self, identity: &PublicKey, blob: &[u8]) -> Result<(), PersistenceError> {
        if self.take_failure() {
            return Err(PersistenceError::Unavailable {
                reason: "injected save failure".to_string(),
            });
        }
        self.blobs
            .lock()
            .expect("save map mutex poisoned")
            .insert(*identity, blob.to_vec());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, identity: &PublicKey) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self
            .blobs
            .lock()
            .expect("save map mutex poisoned")
            .get(identity)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<PublicKey>, PersistenceError> {
        let mut identities: Vec<PublicKey> = self
            .blobs
            .lock()
            .expect("save map mutex poisoned")
            .keys()
            .copied()
            .collect();
        identities.sort();
        Ok(identities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::Params;

    fn identity(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    fn cheap_cipher(passphrase: &str) -> SaveCipher {
        let params = Params::new(256, 1, 1, Some(32)).expect("params");
        SaveCipher::with_params(passphrase, params).expect("cipher")
    }

    #[tokio::test]
    async fn file_save_overwrites_and_loads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let manager = FileSaveManager::new(dir.path().join("profiles"));
        let id = identity(1);

        assert!(manager.load(&id).await?.is_none());
        manager.save(&id, b"first").await?;
        manager.save(&id, b"second").await?;
        assert_eq!(manager.load(&id).await?, Some(b"second".to_vec()));

        let path = manager.path_for(&id);
        assert!(path.to_string_lossy().ends_with(&format!("{}.tox", id.to_hex())));
        assert!(!path.with_extension("tox.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn list_returns_stored_identities_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let manager = FileSaveManager::new(dir.path());
        manager.save(&identity(2), b"b").await?;
        manager.save(&identity(1), b"a").await?;
        std::fs::write(dir.path().join("notes.txt"), b"ignored")?;
        std::fs::write(dir.path().join("garbage.tox"), b"ignored")?;

        assert_eq!(manager.list().await?, vec![identity(1), identity(2)]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let manager = FileSaveManager::new(dir.path().join("absent"));
        assert!(manager.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn encrypted_saves_need_the_passphrase() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let id = identity(3);
        let writer = FileSaveManager::new(dir.path()).with_cipher(cheap_cipher("secret"));
        writer.save(&id, b"profile").await?;

        let raw = std::fs::read(writer.path_for(&id))?;
        assert!(is_encrypted(&raw));
        assert_eq!(writer.load(&id).await?, Some(b"profile".to_vec()));

        let plain_reader = FileSaveManager::new(dir.path());
        assert!(matches!(
            plain_reader.load(&id).await,
            Err(PersistenceError::Encrypted)
        ));

        let wrong = FileSaveManager::new(dir.path()).with_cipher(cheap_cipher("guess"));
        assert!(matches!(wrong.load(&id).await, Err(PersistenceError::Decrypt)));
        Ok(())
    }

    #[tokio::test]
    async fn memory_manager_counts_and_injects_failures() -> anyhow::Result<()> {
        let manager = MemorySaveManager::new();
        let id = identity(4);
        manager.fail_next_saves(1);
        assert!(manager.save(&id, b"x").await.is_err());
        manager.save(&id, b"y").await?;
        assert_eq!(manager.save_count(), 1);
        assert_eq!(manager.load(&id).await?, Some(b"y".to_vec()));
        assert_eq!(manager.list().await?, vec![id]);
        Ok(())
    }
}
