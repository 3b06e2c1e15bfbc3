//! # switchyard-engine
//!
//! Per-channel single-flight executors.
//!
//! An [`Executor`] tails its channel's request log in the current session
//! and runs at most one unit of work at a time through a [`ChannelHandler`]:
//! [`SystemHandler`] for shell commands, [`WorkerHandler`] for the codex and
//! opencode CLIs.

pub mod credentials;
pub mod error;
pub mod executor;
pub mod handler;
pub mod slot;
pub mod system;
pub mod workdir;
pub mod worker;

pub use error::{EngineError, SetupError};
pub use executor::{Executor, ExecutorConfig};
pub use handler::{ChannelHandler, Dispatch, EventSink, UnitContext, UnitOutcome};
pub use slot::Slot;
pub use system::SystemHandler;
pub use worker::{CodexRuntime, OpenCodeRuntime, WorkerHandler};

use switchyard_bus::SessionResolver;
use switchyard_core::Channel;
use switchyard_settings::SwitchyardSettings;
use tokio_util::sync::CancellationToken;

use crate::credentials::CredentialStore;
use crate::workdir::process_base_dir;

/// Build the executor for `channel` from settings and run it until
/// `shutdown` fires.
pub async fn run_channel(
    channel: Channel,
    settings: &SwitchyardSettings,
    shutdown: CancellationToken,
) -> Result<(), EngineError> {
    let state_dir = settings.state_dir();
    let sessions = SessionResolver::new(&state_dir);
    let config = ExecutorConfig::from(&settings.executor);
    let default_cwd = settings.executor.default_cwd.clone();
    let base_dir = process_base_dir();

    match channel {
        Channel::System => {
            let handler = SystemHandler::new(settings.system.clone(), default_cwd, base_dir);
            Executor::new(handler, sessions, config)?.run(shutdown).await
        }
        Channel::Codex => {
            let profile = settings.workers.codex.clone();
            let handler = WorkerHandler::new(
                CodexRuntime::new(profile.clone()),
                profile,
                CredentialStore::in_state_dir(&state_dir),
                default_cwd,
                base_dir,
            );
            Executor::new(handler, sessions, config)?.run(shutdown).await
        }
        Channel::OpenCode => {
            let profile = settings.workers.opencode.clone();
            let handler = WorkerHandler::new(
                OpenCodeRuntime::new(profile.clone()),
                profile,
                CredentialStore::in_state_dir(&state_dir),
                default_cwd,
                base_dir,
            );
            Executor::new(handler, sessions, config)?.run(shutdown).await
        }
    }
}
