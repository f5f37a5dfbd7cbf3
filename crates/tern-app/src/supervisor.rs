//! Owns the current session and restarts it on demand.

use tern_config::SettingsStore;
use tern_session::{SessionDependencies, SessionHandle};
use tern_telemetry::session_span;
use tokio::sync::Mutex;
use tracing::{Instrument, info};

use crate::error::{AppError, AppResult};

/// Starts, stops and restarts the single session of the process.
pub struct SessionSupervisor {
    dependencies: SessionDependencies,
    settings: SettingsStore,
    current: Mutex<Option<SessionHandle>>,
}

impl SessionSupervisor {
    /// Supervisor starting sessions with `dependencies` and the settings in
    /// `settings`.
    #[must_use]
    pub fn new(dependencies: SessionDependencies, settings: SettingsStore) -> Self {
        Self {
            dependencies,
            settings,
            current: Mutex::new(None),
        }
    }

    /// Running session, if any.
    pub async fn current(&self) -> Option<SessionHandle> {
        self.current.lock().await.clone()
    }

    /// Start a session from the first stored profile, or from a fresh identity
    /// when none is stored. A session that is already live is returned as is.
    ///
    /// # Errors
    ///
    /// Returns an error when settings or the profile cannot be read, or the
    /// engine rejects them.
    pub async fn try_load(&self) -> AppResult<SessionHandle> {
        let mut current = self.current.lock().await;
        if let Some(handle) = current.as_ref()
            && handle.state().is_live()
        {
            return Ok(handle.clone());
        }

        let settings = self
            .settings
            .load()
            .await
            .map_err(|err| AppError::config("settings.load", err))?;
        let saves = &self.dependencies.saves;
        let profiles = saves
            .list()
            .await
            .map_err(|err| AppError::persistence("profiles.list", err))?;
        let (label, save_data) = match profiles.first() {
            Some(identity) => {
                let blob = saves
                    .load(identity)
                    .await
                    .map_err(|err| AppError::persistence("profiles.load", err))?;
                (identity.to_hex(), blob)
            }
            None => {
                info!("no stored profile; creating a new identity");
                ("new".to_string(), None)
            }
        };

        let dependencies = SessionDependencies {
            bootstrap_nodes: settings.bootstrap_nodes.clone(),
            ..self.dependencies.clone()
        };
        let handle = tern_session::start(&dependencies, settings.save_options(save_data))
            .instrument(session_span(&label))
            .await
            .map_err(|err| AppError::session("session.start", err))?;
        info!(tox_id = %handle.tox_id().to_hex(), "session ready");
        *current = Some(handle.clone());
        Ok(handle)
    }

    /// Stop the running session and wait for its final save.
    ///
    /// # Errors
    ///
    /// Returns an error when the final save failed.
    pub async fn stop(&self) -> AppResult<()> {
        let Some(handle) = self.current.lock().await.take() else {
            return Ok(());
        };
        handle
            .stop()
            .await
            .map_err(|err| AppError::session("session.stop", err))
    }

    /// Stop the running session, then start again from the stored profile.
    ///
    /// # Errors
    ///
    /// Propagates failures from [`SessionSupervisor::stop`] and
    /// [`SessionSupervisor::try_load`].
    pub async fn restart(&self) -> AppResult<SessionHandle> {
        info!("restarting session");
        self.stop().await?;
        self.try_load().await
    }
}
