use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use tern_config::{SETTINGS_FILE_NAME, SettingsStore};
use tern_core::{ContactRepository, EngineFactory, SaveManager};
use tern_events::EventBus;
use tern_session::stub::{StubEngineFactory, StubProbe};
use tern_session::{FileSaveManager, MemoryContactRepository, SaveCipher, SessionDependencies};
use tern_telemetry::{GlobalContextGuard, LogFormat, LoggingConfig};
use tracing::info;

use crate::contact_sync::spawn_contact_sync;
use crate::error::{AppError, AppResult};
use crate::supervisor::SessionSupervisor;

/// Directory used for settings and profiles when `TERN_DATA_DIR` is unset.
pub const DEFAULT_DATA_DIR: &str = ".tern";

/// Process configuration read from the environment.
#[derive(Clone)]
pub struct AppConfig {
    /// Settings document.
    pub settings_path: PathBuf,
    /// Directory holding `<PUBLICKEY>.tox` profiles.
    pub data_dir: PathBuf,
    /// Enables profile encryption when set.
    pub passphrase: Option<String>,
}

impl AppConfig {
    /// Read `TERN_DATA_DIR`, `TERN_CONFIG` and `TERN_SAVE_PASSPHRASE`.
    ///
    /// # Errors
    ///
    /// Returns an error when the passphrase is set but empty.
    pub fn from_env() -> AppResult<Self> {
        Self::from_values(
            std::env::var("TERN_DATA_DIR").ok(),
            std::env::var("TERN_CONFIG").ok(),
            std::env::var("TERN_SAVE_PASSPHRASE").ok(),
        )
    }

    fn from_values(
        data_dir: Option<String>,
        settings_path: Option<String>,
        passphrase: Option<String>,
    ) -> AppResult<Self> {
        let data_dir = PathBuf::from(data_dir.unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));
        let settings_path = settings_path
            .map_or_else(|| data_dir.join(SETTINGS_FILE_NAME), PathBuf::from);
        if passphrase.as_deref().is_some_and(str::is_empty) {
            return Err(AppError::InvalidConfig {
                field: "TERN_SAVE_PASSPHRASE",
                reason: "empty",
            });
        }
        Ok(Self {
            settings_path,
            data_dir,
            passphrase,
        })
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("settings_path", &self.settings_path)
            .field("data_dir", &self.data_dir)
            .field("encrypted", &self.passphrase.is_some())
            .finish()
    }
}

/// Entry point for the Tern boot sequence.
///
/// # Errors
///
/// Returns an error if configuration, logging or session startup fails.
pub async fn run_app() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    let settings = SettingsStore::new(&config.settings_path)
        .load()
        .await
        .map_err(|err| AppError::config("settings.load", err))?;
    let logging = LoggingConfig {
        level: &settings.log_level,
        format: LogFormat::parse(settings.log_format.as_str()),
        ..LoggingConfig::default()
    };
    tern_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    let _context = GlobalContextGuard::new("bootstrap");

    run_app_with(config, shutdown_signal()).await
}

/// Boot sequence with an injected shutdown trigger.
///
/// # Errors
///
/// Returns an error if the session cannot start, the shutdown trigger fails,
/// or the final save fails.
pub async fn run_app_with(
    config: AppConfig,
    shutdown: impl Future<Output = AppResult<()>>,
) -> AppResult<()> {
    info!(config = ?config, "tern bootstrap starting");

    let mut saves = FileSaveManager::new(&config.data_dir);
    if let Some(passphrase) = &config.passphrase {
        let cipher = SaveCipher::new(passphrase.as_str())
            .map_err(|err| AppError::persistence("save_cipher.new", err))?;
        saves = saves.with_cipher(cipher);
    }
    let saves: Arc<dyn SaveManager> = Arc::new(saves);
    let contacts: Arc<dyn ContactRepository> = Arc::new(MemoryContactRepository::new());
    let factory: Arc<dyn EngineFactory> = Arc::new(StubEngineFactory::new(StubProbe::new()));
    let events = EventBus::new();

    let sync = spawn_contact_sync(&events, Arc::clone(&contacts));
    let supervisor = SessionSupervisor::new(
        SessionDependencies {
            events,
            ..SessionDependencies::new(factory, saves, contacts)
        },
        SettingsStore::new(&config.settings_path),
    );

    let started = supervisor.try_load().await;
    let outcome = match started {
        Ok(_) => {
            let waited = shutdown.await;
            info!("shutdown requested");
            let stopped = supervisor.stop().await;
            waited.and(stopped)
        }
        Err(err) => Err(err),
    };

    sync.abort();
    if outcome.is_ok() {
        info!("tern shutdown complete");
    }
    outcome
}

async fn shutdown_signal() -> AppResult<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::Io {
            operation: "signal.ctrl_c",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_the_data_directory() -> AppResult<()> {
        let config = AppConfig::from_values(Some("/var/lib/tern".into()), None, None)?;
        assert_eq!(config.settings_path, PathBuf::from("/var/lib/tern/settings.json"));
        assert!(config.passphrase.is_none());

        let config = AppConfig::from_values(None, Some("/etc/tern.json".into()), None)?;
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.settings_path, PathBuf::from("/etc/tern.json"));
        Ok(())
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        let result = AppConfig::from_values(None, None, Some(String::new()));
        assert!(matches!(
            result,
            Err(AppError::InvalidConfig {
                field: "TERN_SAVE_PASSPHRASE",
                ..
            })
        ));
    }

    #[test]
    fn debug_output_hides_the_passphrase() -> AppResult<()> {
        let config = AppConfig::from_values(None, None, Some("hunter2".into()))?;
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("encrypted: true"));
        Ok(())
    }
}
