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

//! Engine-agnostic session interfaces and domain types.

pub mod engine;
pub mod error;
pub mod model;
pub mod service;

pub use engine::{EngineFactory, ProtocolEngine};
pub use error::{
    BootstrapError, EngineOperationError, EngineResult, EngineStartError, KeyParseError,
    PersistenceError, ProxyValidationError, SessionError, SessionResult,
};
pub use model::{
    BootstrapNode, Contact, ContactInfo, EngineEvent, MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH,
    MAX_REQUEST_MESSAGE_LENGTH, MAX_STATUS_MESSAGE_LENGTH, PUBLIC_KEY_SIZE, ProxyType, PublicKey,
    SEED_NODES, SaveOptions, ToxId, seed_nodes,
};
pub use service::{ContactRepository, SaveManager, ToxFacade};
pub use tern_events::{ConnectionStatus, FileKind, MessageType, SessionState, UserStatus};
