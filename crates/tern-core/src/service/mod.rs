//! Storage contracts and the operation surface exposed to callers.

use async_trait::async_trait;
use tern_events::{FileKind, MessageType, UserStatus};

use crate::error::{PersistenceError, SessionResult};
use crate::model::{Contact, PublicKey, ToxId};

/// Durable store for engine save blobs, keyed by identity.
///
/// `save` must replace the previous blob atomically; it is called after every
/// mutation, so implementations see a high call rate.
#[async_trait]
pub trait SaveManager: Send + Sync {
    /// Overwrite the blob stored for `identity`.
    async fn save(&self, identity: &PublicKey, blob: &[u8]) -> Result<(), PersistenceError>;

    /// Load the blob stored for `identity`, if any.
    async fn load(&self, identity: &PublicKey) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Identities with a stored blob.
    async fn list(&self) -> Result<Vec<PublicKey>, PersistenceError>;
}

/// Local contact records mirrored from the engine.
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Whether a record exists for the hex key.
    async fn exists(&self, public_key: &str) -> Result<bool, PersistenceError>;

    /// Insert a record; replaces any existing record with the same key.
    async fn add(&self, contact: Contact) -> Result<(), PersistenceError>;

    /// Clear connection and typing state on every record.
    async fn reset_transient_data(&self) -> Result<(), PersistenceError>;

    /// Fetch a record by hex key.
    async fn get(&self, public_key: &str) -> Result<Option<Contact>, PersistenceError>;

    /// Apply `update` to an existing record. Returns false when missing.
    async fn update(
        &self,
        public_key: &str,
        update: Box<dyn for<'c> FnOnce(&'c mut Contact) + Send>,
    ) -> Result<bool, PersistenceError>;

    /// Remove a record. Returns false when missing.
    async fn delete(&self, public_key: &str) -> Result<bool, PersistenceError>;
}

/// Operations callers submit to a running session.
///
/// Every call is one unit of work executed in submission order. Mutations
/// persist the engine state before resolving; getters never persist.
#[async_trait]
pub trait ToxFacade: Send + Sync {
    /// Accept a pending contact request.
    async fn accept_friend_request(&self, public_key: PublicKey) -> SessionResult<()>;

    /// Accept an incoming file.
    async fn start_file_transfer(&self, public_key: PublicKey, file_number: u32)
    -> SessionResult<()>;

    /// Cancel a file transfer.
    async fn stop_file_transfer(&self, public_key: PublicKey, file_number: u32)
    -> SessionResult<()>;

    /// Offer a file to a contact; returns its file number.
    async fn send_file(
        &self,
        public_key: PublicKey,
        kind: FileKind,
        size: u64,
        name: String,
    ) -> SessionResult<u32>;

    /// Send one chunk of an outgoing file.
    async fn send_file_chunk(
        &self,
        public_key: PublicKey,
        file_number: u32,
        position: u64,
        data: Vec<u8>,
    ) -> SessionResult<()>;

    /// Change our display name.
    async fn set_name(&self, name: String) -> SessionResult<()>;

    /// Change our status message.
    async fn set_status_message(&self, status_message: String) -> SessionResult<()>;

    /// Send a contact request.
    async fn add_contact(&self, tox_id: ToxId, message: String) -> SessionResult<()>;

    /// Remove a contact.
    async fn delete_contact(&self, public_key: PublicKey) -> SessionResult<()>;

    /// Send a message; returns its id.
    async fn send_message(
        &self,
        public_key: PublicKey,
        text: String,
        kind: MessageType,
    ) -> SessionResult<u32>;

    /// Toggle typing towards a contact.
    async fn set_typing(&self, public_key: PublicKey, typing: bool) -> SessionResult<()>;

    /// Change our availability.
    async fn set_status(&self, status: UserStatus) -> SessionResult<()>;

    /// Hang up a call.
    async fn end_call(&self, public_key: PublicKey) -> SessionResult<()>;

    /// Current engine save blob.
    async fn save_data(&self) -> SessionResult<Vec<u8>>;

    /// Our display name.
    async fn name(&self) -> SessionResult<String>;

    /// Our status message.
    async fn status_message(&self) -> SessionResult<String>;
}
