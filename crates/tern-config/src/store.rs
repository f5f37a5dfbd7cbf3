//! JSON-file backed settings store.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::model::{Settings, SettingsDocument};
use crate::validate::settings_from_document;

/// File name used when only a directory is known.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Reads and atomically rewrites `settings.json`.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by `settings.json` inside `directory`.
    #[must_use]
    pub fn in_directory(directory: impl AsRef<Path>) -> Self {
        Self::new(directory.as_ref().join(SETTINGS_FILE_NAME))
    }

    /// Location of the settings file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or is not a JSON object.
    pub async fn load(&self) -> ConfigResult<Settings> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "settings file missing; using defaults");
                return Ok(Settings::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    operation: "settings.read",
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let value: Value =
            serde_json::from_slice(&raw).map_err(|error| ConfigError::InvalidDocument {
                path: self.path.clone(),
                reason: error.to_string(),
            })?;
        let Value::Object(document) = value else {
            return Err(ConfigError::InvalidDocument {
                path: self.path.clone(),
                reason: "top level must be an object".to_string(),
            });
        };

        let settings = settings_from_document(&document);
        debug!(path = %self.path.display(), proxy_type = ?settings.proxy_type, "settings loaded");
        Ok(settings)
    }

    /// Persist settings through a temp file and rename.
    ///
    /// # Errors
    ///
    /// Returns an error when encoding or any filesystem step fails.
    pub async fn save(&self, settings: &Settings) -> ConfigResult<()> {
        let encoded = serde_json::to_vec_pretty(&SettingsDocument::from(settings))
            .map_err(|source| ConfigError::Encode { source })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Io {
                    operation: "settings.create_dir",
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, &encoded)
            .await
            .map_err(|source| ConfigError::Io {
                operation: "settings.write",
                path: staging.clone(),
                source,
            })?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|source| ConfigError::Io {
                operation: "settings.rename",
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Load, apply `change`, and save. Returns the updated settings.
    ///
    /// # Errors
    ///
    /// Propagates load and save failures.
    pub async fn update(&self, change: impl FnOnce(&mut Settings)) -> ConfigResult<Settings> {
        let mut settings = self.load().await?;
        change(&mut settings);
        self.save(&settings).await?;
        Ok(settings)
    }
}
