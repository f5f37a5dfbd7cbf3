//! Contract for the protocol engine driven by the session worker.
//!
//! The engine is owned by exactly one worker task, so every method takes
//! `&mut self` and implementations need no internal locking.

use std::time::Duration;

use async_trait::async_trait;
use tern_events::{FileKind, MessageType, UserStatus};

use crate::error::{BootstrapError, EngineOperationError, EngineResult, EngineStartError};
use crate::model::{BootstrapNode, ContactInfo, EngineEvent, PublicKey, SaveOptions, ToxId};

/// Cryptographic and network protocol state machine.
#[async_trait]
pub trait ProtocolEngine: Send {
    /// Delay the engine wants before the next `iterate`. May change every tick.
    fn iteration_interval(&self) -> Duration;

    /// Our shareable address.
    fn tox_id(&self) -> ToxId;

    /// Our long-term key.
    fn public_key(&self) -> PublicKey;

    /// Serialized state suitable for handing to a save manager.
    fn save_data(&self) -> Vec<u8>;

    /// Contacts known to the engine.
    fn contacts(&self) -> Vec<ContactInfo>;

    /// Our display name.
    fn name(&self) -> String;

    /// Our status message.
    fn status_message(&self) -> String;

    /// Run one step of the protocol.
    async fn iterate(&mut self) -> EngineResult<()>;

    /// Contact one bootstrap node.
    async fn bootstrap(&mut self, node: &BootstrapNode) -> Result<(), BootstrapError>;

    /// Drain callbacks raised since the last call.
    fn poll_events(&mut self) -> Vec<EngineEvent> {
        Vec::new()
    }

    /// Set our display name.
    async fn set_name(&mut self, name: &str) -> EngineResult<()>;

    /// Set our status message.
    async fn set_status_message(&mut self, status_message: &str) -> EngineResult<()>;

    /// Set our availability.
    async fn set_status(&mut self, status: UserStatus) -> EngineResult<()>;

    /// Send a contact request carrying `message`.
    async fn add_contact(&mut self, tox_id: &ToxId, message: &str) -> EngineResult<()>;

    /// Accept an incoming contact request.
    async fn accept_friend_request(&mut self, public_key: &PublicKey) -> EngineResult<()>;

    /// Remove a contact.
    async fn delete_contact(&mut self, public_key: &PublicKey) -> EngineResult<()>;

    /// Send a message; returns the engine's message id for read receipts.
    async fn send_message(
        &mut self,
        public_key: &PublicKey,
        text: &str,
        kind: MessageType,
    ) -> EngineResult<u32>;

    /// Toggle our typing indicator towards a contact.
    async fn set_typing(&mut self, public_key: &PublicKey, typing: bool) -> EngineResult<()>;

    /// Resume (accept) an incoming transfer.
    async fn start_file_transfer(
        &mut self,
        public_key: &PublicKey,
        file_number: u32,
    ) -> EngineResult<()>;

    /// Cancel a transfer in either direction.
    async fn stop_file_transfer(
        &mut self,
        public_key: &PublicKey,
        file_number: u32,
    ) -> EngineResult<()>;

    /// Offer a file; returns the file number.
    async fn send_file(
        &mut self,
        public_key: &PublicKey,
        kind: FileKind,
        size: u64,
        name: &str,
    ) -> EngineResult<u32>;

    /// Supply a chunk requested through `FileChunkRequested`.
    async fn send_file_chunk(
        &mut self,
        public_key: &PublicKey,
        file_number: u32,
        position: u64,
        data: &[u8],
    ) -> EngineResult<()>;

    /// Hang up a call; default implementation reports lack of support.
    async fn end_call(&mut self, public_key: &PublicKey) -> EngineResult<()> {
        let _ = public_key;
        Err(EngineOperationError::Native {
            message: "calls not supported by this engine".to_string(),
        })
    }

    /// Release engine resources. Called exactly once per engine.
    async fn shutdown(&mut self) {}
}

/// Builds engines from save options.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Construct an engine, validating the options.
    async fn create(&self, options: &SaveOptions)
    -> Result<Box<dyn ProtocolEngine>, EngineStartError>;
}
