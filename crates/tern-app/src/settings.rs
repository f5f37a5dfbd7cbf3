//! Network settings edits, proxy checks and the restart they require.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tern_config::{Settings, SettingsStore};
use tern_core::{EngineFactory, ProxyType, ProxyValidationError};
use tern_session::{ProxyCheck, SessionHandle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::supervisor::SessionSupervisor;

/// Verdict of the latest proxy check.
pub type ProxyStatus = Result<(), ProxyValidationError>;

/// Applies settings changes and decides when the session must restart.
///
/// Every setter persists immediately. Changes to UDP or the proxy type always
/// require a restart; address and port changes only while a proxy is in use.
/// Each proxy change starts a new check and abandons the previous one.
pub struct SettingsController {
    store: SettingsStore,
    factory: Arc<dyn EngineFactory>,
    supervisor: Arc<SessionSupervisor>,
    restart_needed: AtomicBool,
    generation: Arc<AtomicU64>,
    check: Mutex<Option<JoinHandle<()>>>,
    proxy_status: Arc<watch::Sender<Option<ProxyStatus>>>,
    committed: watch::Sender<bool>,
}

impl SettingsController {
    /// Controller editing `store` and restarting through `supervisor`.
    #[must_use]
    pub fn new(
        store: SettingsStore,
        factory: Arc<dyn EngineFactory>,
        supervisor: Arc<SessionSupervisor>,
    ) -> Self {
        Self {
            store,
            factory,
            supervisor,
            restart_needed: AtomicBool::new(false),
            generation: Arc::new(AtomicU64::new(0)),
            check: Mutex::new(None),
            proxy_status: Arc::new(watch::channel(None).0),
            committed: watch::channel(false).0,
        }
    }

    /// Current settings as stored.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file cannot be read.
    pub async fn settings(&self) -> AppResult<Settings> {
        self.store
            .load()
            .await
            .map_err(|err| AppError::config("settings.load", err))
    }

    /// Whether a committed change will restart the session.
    #[must_use]
    pub fn restart_needed(&self) -> bool {
        self.restart_needed.load(Ordering::SeqCst)
    }

    /// Results of proxy checks; `None` until the first one completes.
    #[must_use]
    pub fn proxy_status(&self) -> watch::Receiver<Option<ProxyStatus>> {
        self.proxy_status.subscribe()
    }

    /// Flips to `true` once [`SettingsController::commit`] finished.
    #[must_use]
    pub fn committed(&self) -> watch::Receiver<bool> {
        self.committed.subscribe()
    }

    /// Allow or forbid direct UDP.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings cannot be saved.
    pub async fn set_udp_enabled(&self, enabled: bool) -> AppResult<()> {
        self.update(|settings| settings.udp_enabled = enabled)
            .await?;
        self.restart_needed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Change the proxy kind.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings cannot be read or saved.
    pub async fn set_proxy_type(&self, proxy_type: ProxyType) -> AppResult<()> {
        if self.settings().await?.proxy_type == proxy_type {
            return Ok(());
        }
        let settings = self
            .update(|settings| settings.proxy_type = proxy_type)
            .await?;
        self.restart_needed.store(true, Ordering::SeqCst);
        self.check_proxy(&settings);
        Ok(())
    }

    /// Change the proxy host.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings cannot be read or saved.
    pub async fn set_proxy_address(&self, address: &str) -> AppResult<()> {
        if self.settings().await?.proxy_address == address {
            return Ok(());
        }
        let settings = self
            .update(|settings| settings.proxy_address = address.to_string())
            .await?;
        if settings.proxy_type.is_active() {
            self.restart_needed.store(true, Ordering::SeqCst);
        }
        self.check_proxy(&settings);
        Ok(())
    }

    /// Change the proxy port.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings cannot be read or saved.
    pub async fn set_proxy_port(&self, port: u16) -> AppResult<()> {
        if self.settings().await?.proxy_port == port {
            return Ok(());
        }
        let settings = self.update(|settings| settings.proxy_port = port).await?;
        if settings.proxy_type.is_active() {
            self.restart_needed.store(true, Ordering::SeqCst);
        }
        self.check_proxy(&settings);
        Ok(())
    }

    /// Apply pending changes, restarting the session if any of them needs it.
    ///
    /// Returns the new session when a restart happened.
    ///
    /// # Errors
    ///
    /// Returns an error when stopping or starting the session fails.
    pub async fn commit(&self) -> AppResult<Option<SessionHandle>> {
        let restarted = if self.restart_needed.swap(false, Ordering::SeqCst) {
            Some(self.supervisor.restart().await?)
        } else {
            None
        };
        self.committed.send_replace(true);
        info!(restarted = restarted.is_some(), "settings committed");
        Ok(restarted)
    }

    async fn update(&self, change: impl FnOnce(&mut Settings) + Send) -> AppResult<Settings> {
        self.store
            .update(change)
            .await
            .map_err(|err| AppError::config("settings.update", err))
    }

    fn check_proxy(&self, settings: &Settings) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let probe = ProxyCheck::spawn(Arc::clone(&self.factory), settings.save_options(None));
        let latest = Arc::clone(&self.generation);
        let status = Arc::clone(&self.proxy_status);
        let forward = tokio::spawn(async move {
            let Some(outcome) = probe.outcome().await else {
                return;
            };
            // A newer check may have started while this one ran.
            if latest.load(Ordering::SeqCst) == generation {
                debug!(generation, ?outcome, "proxy check finished");
                status.send_replace(Some(outcome));
            }
        });

        let previous = self
            .check
            .lock()
            .expect("proxy check mutex poisoned")
            .replace(forward);
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for SettingsController {
    fn drop(&mut self) {
        if let Ok(mut check) = self.check.lock()
            && let Some(pending) = check.take()
        {
            pending.abort();
        }
    }
}
