//! Cloneable handle to a running session.

use std::sync::Arc;

use async_trait::async_trait;
use tern_core::{
    FileKind, MessageType, PublicKey, SessionError, SessionResult, ToxFacade, ToxId, UserStatus,
};
use tern_events::{EventBus, EventStream, SessionState};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::command::{Reply, SessionCommand};
use crate::worker::advance_state;

/// Handle to one session.
///
/// Every operation is queued to the worker that owns the engine and resolved
/// once that worker has run it, including the save that follows a mutation.
/// Dropping an operation future after it was submitted abandons only the
/// caller's interest; the work still runs.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    state: Arc<watch::Sender<SessionState>>,
    started: watch::Receiver<bool>,
    events: EventBus,
    tox_id: ToxId,
    public_key: PublicKey,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SessionCommand>,
        state: Arc<watch::Sender<SessionState>>,
        started: watch::Receiver<bool>,
        events: EventBus,
        tox_id: ToxId,
    ) -> Self {
        let public_key = tox_id.public_key();
        Self {
            commands,
            state,
            started,
            events,
            tox_id,
            public_key,
        }
    }

    /// Our address, read once when the engine was constructed.
    #[must_use]
    pub const fn tox_id(&self) -> ToxId {
        self.tox_id
    }

    /// Our long-term key, read once when the engine was constructed.
    #[must_use]
    pub const fn public_key(&self) -> PublicKey {
        self.public_key
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the iteration loop is still running.
    #[must_use]
    pub fn is_started(&self) -> bool {
        *self.started.borrow()
    }

    /// Bus the session publishes to.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to session events from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe(None)
    }

    /// Stop the session and wait for the final save.
    ///
    /// Work queued before the stop request still runs. Calling this again, or
    /// from another clone, waits for the same teardown and succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Persistence`] when the final save failed.
    pub async fn stop(&self) -> SessionResult<()> {
        let (respond_to, response) = oneshot::channel();
        if self
            .commands
            .send(SessionCommand::Stop { respond_to })
            .await
            .is_err()
        {
            self.wait_until_stopped().await;
            return Ok(());
        }
        advance_state(&self.state, &self.events, SessionState::Stopping);
        debug!("stop requested");

        if let Ok(outcome) = response.await {
            outcome
        } else {
            self.wait_until_stopped().await;
            Ok(())
        }
    }

    /// Resolve once the session reached [`SessionState::Stopped`] or its worker
    /// is gone.
    pub async fn wait_until_stopped(&self) {
        let mut state = self.state.subscribe();
        let stopped = async {
            let _ = state
                .wait_for(|state| *state == SessionState::Stopped)
                .await;
        };
        tokio::select! {
            () = stopped => {}
            () = self.commands.closed() => {}
        }
    }

    async fn request<T>(
        &self,
        operation: &'static str,
        build: impl FnOnce(Reply<T>) -> SessionCommand + Send,
    ) -> SessionResult<T> {
        let (respond_to, response) = oneshot::channel();
        self.commands
            .send(build(respond_to))
            .await
            .map_err(|_| SessionError::Closed { operation })?;
        response
            .await
            .map_err(|_| SessionError::Closed { operation })?
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("public_key", &self.public_key)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ToxFacade for SessionHandle {
    async fn accept_friend_request(&self, public_key: PublicKey) -> SessionResult<()> {
        self.request("accept_friend_request", |respond_to| {
            SessionCommand::AcceptFriendRequest {
                public_key,
                respond_to,
            }
        })
        .await
    }

    async fn start_file_transfer(
        &self,
        public_key: PublicKey,
        file_number: u32,
    ) -> SessionResult<()> {
        self.request("start_file_transfer", |respond_to| {
            SessionCommand::StartFileTransfer {
                public_key,
                file_number,
                respond_to,
            }
        })
        .await
    }

    async fn stop_file_transfer(
        &self,
        public_key: PublicKey,
        file_number: u32,
    ) -> SessionResult<()> {
        self.request("stop_file_transfer", |respond_to| {
            SessionCommand::StopFileTransfer {
                public_key,
                file_number,
                respond_to,
            }
        })
        .await
    }

    async fn send_file(
        &self,
        public_key: PublicKey,
        kind: FileKind,
        size: u64,
        name: String,
    ) -> SessionResult<u32> {
        self.request("send_file", |respond_to| SessionCommand::SendFile {
            public_key,
            kind,
            size,
            name,
            respond_to,
        })
        .await
    }

    async fn send_file_chunk(
        &self,
        public_key: PublicKey,
        file_number: u32,
        position: u64,
        data: Vec<u8>,
    ) -> SessionResult<()> {
        self.request("send_file_chunk", |respond_to| {
            SessionCommand::SendFileChunk {
                public_key,
                file_number,
                position,
                data,
                respond_to,
            }
        })
        .await
    }

    async fn set_name(&self, name: String) -> SessionResult<()> {
        self.request("set_name", |respond_to| SessionCommand::SetName {
            name,
            respond_to,
        })
        .await
    }

    async fn set_status_message(&self, status_message: String) -> SessionResult<()> {
        self.request("set_status_message", |respond_to| {
            SessionCommand::SetStatusMessage {
                status_message,
                respond_to,
            }
        })
        .await
    }

    async fn add_contact(&self, tox_id: ToxId, message: String) -> SessionResult<()> {
        self.request("add_contact", |respond_to| SessionCommand::AddContact {
            tox_id,
            message,
            respond_to,
        })
        .await
    }

    async fn delete_contact(&self, public_key: PublicKey) -> SessionResult<()> {
        self.request("delete_contact", |respond_to| {
            SessionCommand::DeleteContact {
                public_key,
                respond_to,
            }
        })
        .await
    }

    async fn send_message(
        &self,
        public_key: PublicKey,
        text: String,
        kind: MessageType,
    ) -> SessionResult<u32> {
        self.request("send_message", |respond_to| SessionCommand::SendMessage {
            public_key,
            text,
            kind,
            respond_to,
        })
        .await
    }

    async fn set_typing(&self, public_key: PublicKey, typing: bool) -> SessionResult<()> {
        self.request("set_typing", |respond_to| SessionCommand::SetTyping {
            public_key,
            typing,
            respond_to,
        })
        .await
    }

    async fn set_status(&self, status: UserStatus) -> SessionResult<()> {
        self.request("set_status", |respond_to| SessionCommand::SetStatus {
            status,
            respond_to,
        })
        .await
    }

    async fn end_call(&self, public_key: PublicKey) -> SessionResult<()> {
        self.request("end_call", |respond_to| SessionCommand::EndCall {
            public_key,
            respond_to,
        })
        .await
    }

    async fn save_data(&self) -> SessionResult<Vec<u8>> {
        self.request("save_data", |respond_to| SessionCommand::SaveData {
            respond_to,
        })
        .await
    }

    async fn name(&self) -> SessionResult<String> {
        self.request("name", |respond_to| SessionCommand::Name { respond_to })
            .await
    }

    async fn status_message(&self) -> SessionResult<String> {
        self.request("status_message", |respond_to| {
            SessionCommand::StatusMessage { respond_to }
        })
        .await
    }
}
