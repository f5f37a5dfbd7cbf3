//! Proxy validation by constructing a throwaway engine.

use std::sync::Arc;

use tern_core::{EngineFactory, ProxyValidationError, SaveOptions};
use tokio::sync::oneshot;
use tracing::debug;

/// Check whether the proxy described by `options` is usable.
///
/// Builds an engine from `options` with its save data dropped and shuts it
/// down immediately. Start failures that are not about the proxy count as
/// success; [`ProxyType::None`](tern_core::ProxyType::None) succeeds without
/// building anything.
///
/// # Errors
///
/// Returns the [`ProxyValidationError`] matching the engine's rejection.
pub async fn check_proxy(
    factory: &dyn EngineFactory,
    options: &SaveOptions,
) -> Result<(), ProxyValidationError> {
    if !options.proxy_type.is_active() {
        return Ok(());
    }

    let probe = SaveOptions {
        save_data: None,
        ..options.clone()
    };
    match factory.create(&probe).await {
        Ok(mut engine) => {
            engine.shutdown().await;
            debug!(
                proxy_type = ?probe.proxy_type,
                host = %probe.proxy_address,
                port = probe.proxy_port,
                "proxy accepted"
            );
            Ok(())
        }
        Err(error) => match ProxyValidationError::from_start_error(&error) {
            Some(rejection) => {
                debug!(
                    host = %probe.proxy_address,
                    port = probe.proxy_port,
                    error = ?error,
                    "proxy rejected"
                );
                Err(rejection)
            }
            None => {
                debug!(error = ?error, "probe engine failed for a reason unrelated to the proxy");
                Ok(())
            }
        },
    }
}

/// A proxy check running in the background.
#[derive(Debug)]
pub struct ProxyCheck {
    outcome: oneshot::Receiver<Result<(), ProxyValidationError>>,
}

impl ProxyCheck {
    /// Start checking `options` on a detached task.
    #[must_use]
    pub fn spawn(factory: Arc<dyn EngineFactory>, options: SaveOptions) -> Self {
        let (sender, outcome) = oneshot::channel();
        tokio::spawn(async move {
            let result = check_proxy(factory.as_ref(), &options).await;
            let _ = sender.send(result);
        });
        Self { outcome }
    }

    /// Stop waiting for the result. The probe itself runs to completion; it has
    /// no side effects beyond its throwaway engine.
    pub fn cancel(self) {
        debug!("proxy check cancelled");
    }

    /// Wait for the result; `None` if the probe task died.
    pub async fn outcome(self) -> Option<Result<(), ProxyValidationError>> {
        self.outcome.await.ok()
    }
}
