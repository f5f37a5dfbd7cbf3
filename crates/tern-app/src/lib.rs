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

//! Tern application wiring.
//!
//! Layout: `bootstrap.rs` (environment and service wiring), `supervisor.rs`
//! (session lifecycle), `settings.rs` (network settings and restarts),
//! `contact_sync.rs` (bus to contact storage).

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Contact storage kept in step with session events.
pub mod contact_sync;
/// Application error types.
pub mod error;
/// Network settings controller.
pub mod settings;
/// Session lifecycle owner.
pub mod supervisor;

pub use bootstrap::{AppConfig, run_app, run_app_with};
pub use contact_sync::spawn_contact_sync;
pub use error::{AppError, AppResult};
pub use settings::{ProxyStatus, SettingsController};
pub use supervisor::SessionSupervisor;
