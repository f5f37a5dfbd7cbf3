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

//! File-backed settings for the session host.
//!
//! Layout: `model.rs` (typed settings), `validate.rs` (lenient document
//! parsing with fallbacks), `store.rs` (`SettingsStore`, atomic writes).

pub mod error;
pub mod model;
pub mod store;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use model::{DEFAULT_LOG_LEVEL, LogFormatSetting, Settings};
pub use store::{SETTINGS_FILE_NAME, SettingsStore};
