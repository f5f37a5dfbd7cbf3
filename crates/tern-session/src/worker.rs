#![allow(clippy::redundant_pub_crate)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tern_core::{
    BootstrapError, BootstrapNode, ConnectionStatus, Contact, ContactInfo, ContactRepository,
    EngineEvent, EngineResult, PersistenceError, ProtocolEngine, PublicKey, SaveManager,
    SessionError, SessionResult,
};
use tern_events::{Event, EventBus, SessionState};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{Instrument, debug, error, info, warn};

use crate::bootstrap::BootstrapSelector;
use crate::command::{Reply, SessionCommand};
use crate::convert::to_bus_event;

/// Attempts made for each save before the failure is escalated.
pub const SAVE_ATTEMPTS: u32 = 3;
/// Delay before the first save retry; later retries back off linearly.
pub const SAVE_RETRY_BACKOFF: Duration = Duration::from_millis(50);

const SAVE_COMPONENT: &str = "save_manager";
const ENGINE_COMPONENT: &str = "engine";
const CONTACTS_COMPONENT: &str = "contact_store";

/// Everything the worker owns for the lifetime of one session.
pub(crate) struct WorkerParts {
    pub(crate) engine: Box<dyn ProtocolEngine>,
    pub(crate) saves: Arc<dyn SaveManager>,
    pub(crate) contacts: Arc<dyn ContactRepository>,
    pub(crate) events: EventBus,
    pub(crate) selector: BootstrapSelector,
    pub(crate) identity: PublicKey,
    pub(crate) state: Arc<watch::Sender<SessionState>>,
    pub(crate) started: watch::Sender<bool>,
}

pub(crate) fn spawn(
    parts: WorkerParts,
    commands: mpsc::Receiver<SessionCommand>,
) -> JoinHandle<()> {
    let hex = parts.identity.to_hex();
    let span = tracing::info_span!("session", identity = %&hex[..8]);
    tokio::spawn(Worker::new(parts).run(commands).instrument(span))
}

/// Move the session state forward and announce it.
///
/// Only forward transitions are applied, so concurrent requests for the same
/// transition publish a single event.
pub(crate) fn advance_state(
    state: &watch::Sender<SessionState>,
    events: &EventBus,
    next: SessionState,
) -> bool {
    let advanced = state.send_if_modified(|current| {
        let allowed = matches!(
            (*current, next),
            (SessionState::Starting, SessionState::Running)
                | (
                    SessionState::Starting | SessionState::Running,
                    SessionState::Stopping
                )
                | (
                    SessionState::Starting | SessionState::Running | SessionState::Stopping,
                    SessionState::Stopped
                )
        );
        if allowed {
            *current = next;
        }
        allowed
    });
    if advanced {
        info!(state = ?next, "session state changed");
        let _ = events.publish(Event::SessionStateChanged { state: next });
    }
    advanced
}

enum Flow {
    Continue,
    Stop(Reply<()>),
}

struct Worker {
    engine: Box<dyn ProtocolEngine>,
    saves: Arc<dyn SaveManager>,
    contacts: Arc<dyn ContactRepository>,
    events: EventBus,
    selector: BootstrapSelector,
    identity: PublicKey,
    state: Arc<watch::Sender<SessionState>>,
    started: watch::Sender<bool>,
    bootstrap_needed: bool,
    announced_running: bool,
    reconciliation: Option<JoinHandle<Result<usize, PersistenceError>>>,
    health: BTreeSet<String>,
}

impl Worker {
    fn new(parts: WorkerParts) -> Self {
        Self {
            engine: parts.engine,
            saves: parts.saves,
            contacts: parts.contacts,
            events: parts.events,
            selector: parts.selector,
            identity: parts.identity,
            state: parts.state,
            started: parts.started,
            bootstrap_needed: true,
            announced_running: false,
            reconciliation: None,
            health: BTreeSet::new(),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        // A failed initial save is already logged and reflected in health.
        let _ = self.persist("start").await;
        self.reconciliation = Some(tokio::spawn(reconcile_contacts(
            Arc::clone(&self.contacts),
            self.engine.contacts(),
        )));

        let mut stop_signal = self.state.subscribe();
        let mut next_tick = Instant::now();
        let mut stop_reply = None;

        loop {
            tokio::select! {
                biased;
                () = stop_requested(&mut stop_signal) => break,
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Flow::Stop(reply) = self.handle(command).await {
                            stop_reply = Some(reply);
                            break;
                        }
                    }
                    None => break,
                },
                () = sleep_until(next_tick) => {
                    self.tick().await;
                    next_tick = Instant::now() + self.engine.iteration_interval();
                }
            }
        }

        self.started.send_replace(false);
        advance_state(&self.state, &self.events, SessionState::Stopping);
        debug!("iteration loop exited");

        if stop_reply.is_none() {
            stop_reply = self.drain_until_stop(&mut commands).await;
        }

        self.poll_reconciliation(true).await;
        let outcome = self.persist("stop").await;
        self.engine.shutdown().await;
        advance_state(&self.state, &self.events, SessionState::Stopped);
        if let Some(reply) = stop_reply {
            let _ = reply.send(outcome);
        }

        commands.close();
        while let Some(command) = commands.recv().await {
            command.reject_closed();
        }
    }

    /// Run units queued ahead of the stop request, in order.
    async fn drain_until_stop(
        &mut self,
        commands: &mut mpsc::Receiver<SessionCommand>,
    ) -> Option<Reply<()>> {
        while let Some(command) = commands.recv().await {
            if let Flow::Stop(reply) = self.handle(command).await {
                return Some(reply);
            }
        }
        None
    }

    async fn tick(&mut self) {
        if self.bootstrap_needed {
            match self.bootstrap().await {
                Ok(contacted) => {
                    self.bootstrap_needed = false;
                    info!(nodes = contacted, "bootstrap complete");
                }
                Err((node, error)) => {
                    warn!(
                        host = %node.host,
                        port = node.port,
                        error = ?error,
                        "bootstrap failed; retrying next tick"
                    );
                    self.publish(Event::BootstrapFailed {
                        host: node.host,
                        port: node.port,
                        message: error.to_string(),
                    });
                }
            }
        }

        match self.engine.iterate().await {
            Ok(()) => self.mark_recovered(ENGINE_COMPONENT),
            Err(error) => {
                let detail = format!("{error:?}");
                self.mark_degraded(ENGINE_COMPONENT, Some(&detail));
            }
        }
        self.flush_engine_events();

        if !self.announced_running {
            self.announced_running = true;
            advance_state(&self.state, &self.events, SessionState::Running);
        }
        self.poll_reconciliation(false).await;
    }

    /// Contact each selected node; the first failure abandons the rest.
    async fn bootstrap(&mut self) -> Result<usize, (BootstrapNode, BootstrapError)> {
        let nodes = self.selector.select();
        for node in &nodes {
            debug!(host = %node.host, port = node.port, "bootstrapping");
            if let Err(error) = self.engine.bootstrap(node).await {
                return Err((node.clone(), error));
            }
        }
        Ok(nodes.len())
    }

    async fn handle(&mut self, command: SessionCommand) -> Flow {
        let operation = command.operation();
        debug!(operation, "processing session command");
        match command {
            SessionCommand::AcceptFriendRequest {
                public_key,
                respond_to,
            } => {
                let result = self.engine.accept_friend_request(&public_key).await;
                let applied = result.is_ok();
                let outcome = self.commit(operation, result).await;
                if applied {
                    self.publish(Event::ContactAdded {
                        public_key: public_key.to_hex(),
                    });
                }
                let _ = respond_to.send(outcome);
            }
            SessionCommand::StartFileTransfer {
                public_key,
                file_number,
                respond_to,
            } => {
                let result = self
                    .engine
                    .start_file_transfer(&public_key, file_number)
                    .await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::StopFileTransfer {
                public_key,
                file_number,
                respond_to,
            } => {
                let result = self
                    .engine
                    .stop_file_transfer(&public_key, file_number)
                    .await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::SendFile {
                public_key,
                kind,
                size,
                name,
                respond_to,
            } => {
                let result = self.engine.send_file(&public_key, kind, size, &name).await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::SendFileChunk {
                public_key,
                file_number,
                position,
                data,
                respond_to,
            } => {
                let result = self
                    .engine
                    .send_file_chunk(&public_key, file_number, position, &data)
                    .await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::SetName { name, respond_to } => {
                let result = self.engine.set_name(&name).await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::SetStatusMessage {
                status_message,
                respond_to,
            } => {
                let result = self.engine.set_status_message(&status_message).await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::AddContact {
                tox_id,
                message,
                respond_to,
            } => {
                let result = self.engine.add_contact(&tox_id, &message).await;
                let applied = result.is_ok();
                let outcome = self.commit(operation, result).await;
                if applied {
                    self.publish(Event::ContactAdded {
                        public_key: tox_id.public_key().to_hex(),
                    });
                }
                let _ = respond_to.send(outcome);
            }
            SessionCommand::DeleteContact {
                public_key,
                respond_to,
            } => {
                let result = self.engine.delete_contact(&public_key).await;
                let applied = result.is_ok();
                let outcome = self.commit(operation, result).await;
                if applied {
                    self.publish(Event::ContactDeleted {
                        public_key: public_key.to_hex(),
                    });
                }
                let _ = respond_to.send(outcome);
            }
            SessionCommand::SendMessage {
                public_key,
                text,
                kind,
                respond_to,
            } => {
                let result = self.engine.send_message(&public_key, &text, kind).await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::SetTyping {
                public_key,
                typing,
                respond_to,
            } => {
                let result = self.engine.set_typing(&public_key, typing).await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::SetStatus { status, respond_to } => {
                let result = self.engine.set_status(status).await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::EndCall {
                public_key,
                respond_to,
            } => {
                let result = self.engine.end_call(&public_key).await;
                let _ = respond_to.send(self.commit(operation, result).await);
            }
            SessionCommand::SaveData { respond_to } => {
                let _ = respond_to.send(Ok(self.engine.save_data()));
            }
            SessionCommand::Name { respond_to } => {
                let _ = respond_to.send(Ok(self.engine.name()));
            }
            SessionCommand::StatusMessage { respond_to } => {
                let _ = respond_to.send(Ok(self.engine.status_message()));
            }
            SessionCommand::Stop { respond_to } => return Flow::Stop(respond_to),
        }
        self.flush_engine_events();
        Flow::Continue
    }

    /// Finish a mutation: surface the engine error, or persist the new state.
    async fn commit<T>(
        &mut self,
        operation: &'static str,
        result: EngineResult<T>,
    ) -> SessionResult<T> {
        let value = result.map_err(|source| {
            debug!(operation, error = ?source, "engine rejected operation");
            SessionError::Operation { operation, source }
        })?;
        self.persist(operation).await?;
        Ok(value)
    }

    async fn persist(&mut self, operation: &'static str) -> SessionResult<()> {
        let blob = self.engine.save_data();
        let mut attempt = 1;
        loop {
            match self.saves.save(&self.identity, &blob).await {
                Ok(()) => {
                    self.mark_recovered(SAVE_COMPONENT);
                    return Ok(());
                }
                Err(source) if attempt < SAVE_ATTEMPTS => {
                    warn!(operation, attempt, error = ?source, "save failed; retrying");
                    sleep(SAVE_RETRY_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(source) => {
                    error!(operation, attempts = attempt, error = ?source, "save failed; giving up");
                    let detail = source.to_string();
                    self.mark_degraded(SAVE_COMPONENT, Some(&detail));
                    return Err(SessionError::Persistence { operation, source });
                }
            }
        }
    }

    fn flush_engine_events(&mut self) {
        for event in self.engine.poll_events() {
            if matches!(
                event,
                EngineEvent::SelfConnectionChanged {
                    status: ConnectionStatus::None
                }
            ) && !self.bootstrap_needed
            {
                info!("lost overlay connection; bootstrap re-armed");
                self.bootstrap_needed = true;
            }
            self.publish(to_bus_event(event));
        }
    }

    async fn poll_reconciliation(&mut self, wait: bool) {
        let Some(task) = self
            .reconciliation
            .take_if(|task| wait || task.is_finished())
        else {
            return;
        };
        match task.await {
            Ok(Ok(added)) => {
                debug!(added, "contact storage reconciled");
                self.mark_recovered(CONTACTS_COMPONENT);
            }
            Ok(Err(error)) => {
                let detail = format!("{error:?}");
                self.mark_degraded(CONTACTS_COMPONENT, Some(&detail));
            }
            Err(error) => {
                let detail = error.to_string();
                self.mark_degraded(CONTACTS_COMPONENT, Some(&detail));
            }
        }
    }

    fn publish(&self, event: Event) {
        let _ = self.events.publish(event);
    }

    fn mark_degraded(&mut self, component: &str, detail: Option<&str>) {
        let inserted = self.health.insert(component.to_string());
        if inserted {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            self.publish(Event::HealthChanged { degraded });
            if let Some(detail) = detail {
                warn!(component, detail = %detail, "session component degraded");
            } else {
                warn!(component, "session component degraded");
            }
        } else if let Some(detail) = detail {
            warn!(component, detail = %detail, "session component still degraded");
        }
    }

    fn mark_recovered(&mut self, component: &str) {
        if self.health.remove(component) {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            self.publish(Event::HealthChanged { degraded });
            info!(component, "session component recovered");
        }
    }
}

async fn stop_requested(signal: &mut watch::Receiver<SessionState>) {
    // The worker holds a sender, so the channel cannot close under us.
    let _ = signal
        .wait_for(|state| *state == SessionState::Stopping)
        .await;
}

/// Add engine contacts missing from storage and clear stale live state.
async fn reconcile_contacts(
    repository: Arc<dyn ContactRepository>,
    known: Vec<ContactInfo>,
) -> Result<usize, PersistenceError> {
    repository.reset_transient_data().await?;
    let mut added = 0;
    for info in &known {
        if !repository.exists(&info.public_key.to_hex()).await? {
            repository.add(Contact::from_info(info)).await?;
            added += 1;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::MemoryContactRepository;

    #[test]
    fn state_only_moves_forward() {
        let events = EventBus::with_capacity(8);
        let (state, _rx) = watch::channel(SessionState::Starting);
        assert!(advance_state(&state, &events, SessionState::Running));
        assert!(!advance_state(&state, &events, SessionState::Running));
        assert!(advance_state(&state, &events, SessionState::Stopping));
        assert!(!advance_state(&state, &events, SessionState::Running));
        assert!(advance_state(&state, &events, SessionState::Stopped));
        assert!(!advance_state(&state, &events, SessionState::Stopping));
        assert_eq!(events.last_event_id(), Some(3));
    }

    #[tokio::test]
    async fn reconciliation_adds_missing_and_keeps_existing() -> anyhow::Result<()> {
        let repository = MemoryContactRepository::new();
        let known_key = PublicKey::from_bytes([1; 32]);
        let new_key = PublicKey::from_bytes([2; 32]);
        let mut existing = Contact::new(known_key.to_hex());
        existing.name = "kept".into();
        existing.typing = true;
        repository.add(existing).await?;

        let info = |public_key: PublicKey, name: &str| ContactInfo {
            public_key,
            name: name.into(),
            status_message: String::new(),
            status: tern_core::UserStatus::None,
        };
        let added = reconcile_contacts(
            Arc::new(repository.clone()),
            vec![info(known_key, "engine name"), info(new_key, "fresh")],
        )
        .await?;

        assert_eq!(added, 1);
        let kept = repository.get(&known_key.to_hex()).await?.expect("kept");
        assert_eq!(kept.name, "kept");
        assert!(!kept.typing);
        let fresh = repository.get(&new_key.to_hex()).await?.expect("added");
        assert_eq!(fresh.name, "fresh");
        Ok(())
    }
}
