#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(missing_docs, clippy::all, clippy::pedantic)]

//! Binary entrypoint that starts a Tern session and runs it until Ctrl-C.

use tern_app::{AppResult, run_app};

/// Bootstraps the Tern application and blocks until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
