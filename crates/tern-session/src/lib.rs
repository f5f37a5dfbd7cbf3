#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Session loop driving a protocol engine.
//!
//! [`start`] builds an engine, hands it to a single worker task and returns a
//! [`SessionHandle`]. The worker interleaves the engine's iteration ticks with
//! operations queued through the handle, saves the profile after every
//! mutation and republishes engine callbacks on the [`EventBus`].

mod bootstrap;
mod command;
mod contacts;
mod convert;
mod handle;
mod proxy;
mod store;
pub mod stub;
mod worker;

pub use bootstrap::{BootstrapSelector, NODES_PER_ATTEMPT};
pub use contacts::MemoryContactRepository;
pub use handle::SessionHandle;
pub use proxy::{ProxyCheck, check_proxy};
pub use store::{
    ENCRYPTED_MAGIC, FileSaveManager, MemorySaveManager, SAVE_EXTENSION, SaveCipher, is_encrypted,
};
pub use worker::{SAVE_ATTEMPTS, SAVE_RETRY_BACKOFF};

use std::sync::Arc;

use tern_core::{
    BootstrapNode, ContactRepository, EngineFactory, SaveManager, SaveOptions, SessionError,
    SessionResult, seed_nodes,
};
use tern_events::{Event, EventBus, SessionState};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::worker::WorkerParts;

/// Capacity of the operation queue in front of the worker.
pub const COMMAND_BUFFER: usize = 128;

/// Collaborators a session is started with.
#[derive(Clone)]
pub struct SessionDependencies {
    /// Builds the engine from save options.
    pub factory: Arc<dyn EngineFactory>,
    /// Stores the profile blob.
    pub saves: Arc<dyn SaveManager>,
    /// Local contact records reconciled at startup.
    pub contacts: Arc<dyn ContactRepository>,
    /// Bus the session publishes to.
    pub events: EventBus,
    /// Bootstrap candidates.
    pub bootstrap_nodes: Vec<BootstrapNode>,
}

impl SessionDependencies {
    /// Dependencies with an empty event bus and the seed bootstrap nodes.
    #[must_use]
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        saves: Arc<dyn SaveManager>,
        contacts: Arc<dyn ContactRepository>,
    ) -> Self {
        Self {
            factory,
            saves,
            contacts,
            events: EventBus::new(),
            bootstrap_nodes: seed_nodes(),
        }
    }
}

/// Construct an engine from `options` and start a session around it.
///
/// Each call builds a fresh worker; nothing carries over from an earlier
/// session, so the new one bootstraps again.
///
/// # Errors
///
/// Returns [`SessionError::Start`] when the engine cannot be constructed.
pub async fn start(
    dependencies: &SessionDependencies,
    options: SaveOptions,
) -> SessionResult<SessionHandle> {
    let engine = dependencies
        .factory
        .create(&options)
        .await
        .map_err(|source| {
            warn!(error = ?source, "engine construction failed");
            SessionError::from(source)
        })?;

    let tox_id = engine.tox_id();
    let identity = tox_id.public_key();
    let (state, _) = watch::channel(SessionState::Starting);
    let state = Arc::new(state);
    let _ = dependencies.events.publish(Event::SessionStateChanged {
        state: SessionState::Starting,
    });

    let (started, started_view) = watch::channel(true);
    let (commands, queue) = mpsc::channel(COMMAND_BUFFER);
    let parts = WorkerParts {
        engine,
        saves: Arc::clone(&dependencies.saves),
        contacts: Arc::clone(&dependencies.contacts),
        events: dependencies.events.clone(),
        selector: BootstrapSelector::new(dependencies.bootstrap_nodes.clone()),
        identity,
        state: Arc::clone(&state),
        started,
    };
    // Detached: the handle observes completion through the state channel.
    let _worker = worker::spawn(parts, queue);
    info!(public_key = ?identity, "session started");

    Ok(SessionHandle::new(
        commands,
        state,
        started_view,
        dependencies.events.clone(),
        tox_id,
    ))
}
