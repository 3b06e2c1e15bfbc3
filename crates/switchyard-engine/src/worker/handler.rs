//! Turn handling shared by the worker channels.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use switchyard_bus::paths::artifacts_dir;
use switchyard_core::security::Credential;
use switchyard_core::{Channel, CorrelationId, EventKind, RequestRecord};
use switchyard_settings::WorkerProfile;
use tracing::{info, warn};

use super::process::{run_worker, WorkerRun};
use super::{Invocation, Phase, TurnState, WorkerRuntime};
use crate::credentials::CredentialStore;
use crate::error::SetupError;
use crate::handler::{cancel_target, ChannelHandler, Dispatch, UnitContext, UnitOutcome};
use crate::system::WORKER_SPAWN_FAILED;
use crate::workdir::normalize_workdir;

pub const THINK_PHASE_FAILED: &str = "think phase failed";

const PLANNING_PREAMBLE: &str = "You are in planning mode. Do not modify any files. \
Study the task and the repository, then reply with a concise, numbered plan \
for carrying out the task below.";

/// Closed request vocabulary of a worker channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerRequest {
    Turn(TurnUnit),
    Status,
    Cancel { target: CorrelationId },
    Unsupported(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnUnit {
    pub prompt: String,
    pub cwd: Option<String>,
    pub think: bool,
    pub model: Option<String>,
}

impl WorkerRequest {
    pub fn parse(request: &RequestRecord) -> Result<Self, String> {
        Ok(match request.kind.as_str() {
            "status" => Self::Status,
            "cancel" => Self::Cancel {
                target: cancel_target(request),
            },
            "turn" => {
                let prompt = request
                    .arg_str("prompt")
                    .filter(|p| !p.trim().is_empty())
                    .ok_or("turn requires a non-empty \"prompt\" string")?;
                let think = match request.args.get("think") {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(b)) => *b,
                    Some(_) => return Err("\"think\" must be a boolean".into()),
                };
                Self::Turn(TurnUnit {
                    prompt: prompt.to_string(),
                    cwd: request.arg_str("cwd").map(String::from),
                    think,
                    model: request
                        .arg_str("model")
                        .filter(|m| !m.trim().is_empty())
                        .map(String::from),
                })
            }
            other => Self::Unsupported(other.to_string()),
        })
    }
}

#[derive(Debug)]
pub struct PreparedTurn {
    prompt: String,
    cwd: PathBuf,
    think: bool,
    model: Option<String>,
    credential: Option<Credential>,
}

pub struct WorkerHandler<R> {
    runtime: R,
    profile: WorkerProfile,
    credentials: CredentialStore,
    default_cwd: Option<String>,
    base_dir: PathBuf,
}

impl<R: WorkerRuntime> WorkerHandler<R> {
    pub fn new(
        runtime: R,
        profile: WorkerProfile,
        credentials: CredentialStore,
        default_cwd: Option<String>,
        base_dir: PathBuf,
    ) -> Self {
        Self {
            runtime,
            profile,
            credentials,
            default_cwd,
            base_dir,
        }
    }

    async fn invoke(
        &self,
        turn: &PreparedTurn,
        prompt: &str,
        phase: Phase,
        ctx: &UnitContext,
    ) -> std::io::Result<WorkerRun> {
        let mut command = self.runtime.command(Invocation {
            prompt,
            cwd: &turn.cwd,
            model: turn.model.as_deref(),
            phase,
        });
        if let Some(credential) = &turn.credential {
            command
                .env
                .push((credential.env_var.clone(), credential.expose().to_string()));
        }
        let sink = match phase {
            Phase::Think => ctx.events.forced(EventKind::Think),
            Phase::Run => ctx.events.clone(),
        };
        run_worker(&command, &self.runtime, &sink, &ctx.cancel).await
    }
}

#[async_trait]
impl<R: WorkerRuntime> ChannelHandler for WorkerHandler<R> {
    type Unit = TurnUnit;
    type Prepared = PreparedTurn;

    fn channel(&self) -> Channel {
        self.runtime.channel()
    }

    fn parse(&self, request: &RequestRecord) -> Dispatch<TurnUnit> {
        let channel = self.channel();
        match WorkerRequest::parse(request) {
            Err(reason) => Dispatch::invalid(channel, request, reason),
            Ok(WorkerRequest::Turn(unit)) => Dispatch::Unit(unit),
            Ok(WorkerRequest::Status) => Dispatch::Status,
            Ok(WorkerRequest::Cancel { target }) => Dispatch::Cancel { target },
            Ok(WorkerRequest::Unsupported(_)) => Dispatch::unknown_action(channel, request),
        }
    }

    fn prepare(&self, unit: TurnUnit) -> Result<PreparedTurn, SetupError> {
        let cwd = normalize_workdir(
            unit.cwd.as_deref(),
            self.default_cwd.as_deref(),
            &self.base_dir,
        )?;
        let credential = self.credentials.resolve(self.channel(), &self.profile)?;
        if let Some(credential) = &credential {
            info!(channel = %self.channel(), source = %credential.source, "credential resolved");
        }
        Ok(PreparedTurn {
            prompt: unit.prompt,
            cwd,
            think: unit.think,
            model: unit.model,
            credential,
        })
    }

    async fn run(&self, turn: PreparedTurn, ctx: UnitContext) -> UnitOutcome {
        let artifact_dir = artifacts_dir(&ctx.session_dir, &ctx.correlation_id);
        let mut artifacts = Map::new();
        let mut changes = TurnState::default();

        let plan = if turn.think {
            ctx.events
                .forced(EventKind::Think)
                .emit(EventKind::Info, "planning", None);
            let prompt = format!("{PLANNING_PREAMBLE}\n\nTask:\n{}", turn.prompt);
            let planned = match self.invoke(&turn, &prompt, Phase::Think, &ctx).await {
                Err(e) => Err(format!("{WORKER_SPAWN_FAILED}: {e}")),
                Ok(run) if run.succeeded() => {
                    changes.merge_file_changes(&run.turn.file_changes);
                    Ok(run.turn.last_message.unwrap_or_default())
                }
                Ok(run) => Err(run.failure_reason()),
            };
            match planned {
                Ok(plan) => {
                    save_artifact(&artifact_dir, "plan.md", &plan, "plan", &mut artifacts);
                    Some(plan)
                }
                Err(reason) => {
                    return UnitOutcome {
                        ok: false,
                        summary: THINK_PHASE_FAILED.into(),
                        detail: reason.clone(),
                        error: Some(format!("planning failed: {reason}")),
                        artifacts,
                        file_changes: Some(changes.file_changes),
                        ..UnitOutcome::default()
                    };
                }
            }
        } else {
            None
        };

        let prompt = match &plan {
            Some(plan) if !plan.trim().is_empty() => {
                format!("{}\n\nFollow this plan:\n{plan}", turn.prompt)
            }
            _ => turn.prompt.clone(),
        };

        let run = match self.invoke(&turn, &prompt, Phase::Run, &ctx).await {
            Ok(run) => run,
            Err(e) => {
                let mut outcome =
                    UnitOutcome::failed(WORKER_SPAWN_FAILED, format!("{}: {e}", self.profile.bin));
                outcome.artifacts = artifacts;
                outcome.file_changes = Some(changes.file_changes);
                return outcome;
            }
        };

        changes.merge_file_changes(&run.turn.file_changes);
        if let Some(message) = &run.turn.last_message {
            save_artifact(&artifact_dir, "last_message.md", message, "lastMessage", &mut artifacts);
        }

        let ok = run.succeeded();
        let (summary, detail, error) = if ok {
            (
                "completed".to_string(),
                run.turn.last_message.clone().unwrap_or_default(),
                None,
            )
        } else {
            let reason = run.failure_reason();
            let summary = if run.turn.failure.is_some() {
                "worker failed".to_string()
            } else {
                match run.exit_code {
                    Some(code) => format!("worker exited with code {code}"),
                    None => "worker terminated".to_string(),
                }
            };
            (summary, reason.clone(), Some(reason))
        };

        UnitOutcome {
            ok,
            summary,
            detail,
            exit_code: run.exit_code,
            error,
            artifacts,
            file_changes: Some(changes.file_changes),
        }
    }
}

fn save_artifact(
    dir: &Path,
    name: &str,
    content: &str,
    key: &str,
    artifacts: &mut Map<String, Value>,
) {
    let path = dir.join(name);
    let written = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, content));
    match written {
        Ok(()) => {
            let _ = artifacts.insert(key.into(), Value::String(path.display().to_string()));
        }
        Err(e) => warn!(error = %e, path = %path.display(), "artifact write failed"),
    }
}
