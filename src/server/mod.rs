//! Top-level supervisor: owns the config, wires the three actors
//! together, and drives the CLI entry point (spec §4.5, §6).

mod init;
mod run;

use std::sync::Arc;

pub use init::run_server;

use crate::auth::Hooks;
use crate::config::Config;
use crate::event::EventBus;

/// Manages the lifetime of the dispatcher, storage, and listener tasks.
pub struct ServerContext {
    config: Config,
    hooks: Arc<dyn Hooks>,
    events: EventBus,
}
