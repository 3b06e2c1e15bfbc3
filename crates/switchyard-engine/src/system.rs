//! The `system` channel: liveness pings and shell commands.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use switchyard_core::{Channel, CorrelationId, RequestRecord, ResponseRecord};
use switchyard_settings::SystemSettings;
use tracing::debug;

use crate::error::SetupError;
use crate::handler::{cancel_target, ChannelHandler, Dispatch, UnitContext, UnitOutcome};
use crate::workdir::normalize_workdir;

pub const WORKER_SPAWN_FAILED: &str = "worker spawn failed";

/// Closed request vocabulary of the `system` channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SystemRequest {
    Ping,
    Status,
    Exec { command: String, cwd: Option<String> },
    Cancel { target: CorrelationId },
    Unsupported(String),
}

impl SystemRequest {
    pub fn parse(request: &RequestRecord) -> Result<Self, String> {
        Ok(match request.kind.as_str() {
            "ping" => Self::Ping,
            "status" => Self::Status,
            "cancel" => Self::Cancel {
                target: cancel_target(request),
            },
            "exec" => {
                let command = request
                    .arg_str("command")
                    .filter(|c| !c.trim().is_empty())
                    .ok_or("exec requires a non-empty \"command\" string")?;
                Self::Exec {
                    command: command.to_string(),
                    cwd: request.arg_str("cwd").map(String::from),
                }
            }
            other => Self::Unsupported(other.to_string()),
        })
    }
}

#[derive(Debug)]
pub struct ExecUnit {
    command: String,
    cwd: Option<String>,
}

#[derive(Debug)]
pub struct PreparedExec {
    command: String,
    cwd: PathBuf,
}

pub struct SystemHandler {
    settings: SystemSettings,
    default_cwd: Option<String>,
    base_dir: PathBuf,
}

impl SystemHandler {
    pub fn new(settings: SystemSettings, default_cwd: Option<String>, base_dir: PathBuf) -> Self {
        Self {
            settings,
            default_cwd,
            base_dir,
        }
    }
}

#[async_trait]
impl ChannelHandler for SystemHandler {
    type Unit = ExecUnit;
    type Prepared = PreparedExec;

    fn channel(&self) -> Channel {
        Channel::System
    }

    fn parse(&self, request: &RequestRecord) -> Dispatch<ExecUnit> {
        match SystemRequest::parse(request) {
            Err(reason) => Dispatch::invalid(Channel::System, request, reason),
            Ok(SystemRequest::Ping) => Dispatch::Immediate(ResponseRecord::immediate(
                Channel::System,
                request.correlation_id.clone(),
                true,
                "pong",
                "",
            )),
            Ok(SystemRequest::Status) => Dispatch::Status,
            Ok(SystemRequest::Cancel { target }) => Dispatch::Cancel { target },
            Ok(SystemRequest::Exec { command, cwd }) => Dispatch::Unit(ExecUnit { command, cwd }),
            Ok(SystemRequest::Unsupported(_)) => Dispatch::unknown_action(Channel::System, request),
        }
    }

    fn prepare(&self, unit: ExecUnit) -> Result<PreparedExec, SetupError> {
        let cwd = normalize_workdir(
            unit.cwd.as_deref(),
            self.default_cwd.as_deref(),
            &self.base_dir,
        )?;
        Ok(PreparedExec {
            command: unit.command,
            cwd,
        })
    }

    async fn run(&self, prepared: PreparedExec, ctx: UnitContext) -> UnitOutcome {
        let start = Instant::now();
        let mut cmd = tokio::process::Command::new(&self.settings.shell);
        let _ = cmd
            .arg("-c")
            .arg(&prepared.command)
            .current_dir(&prepared.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %prepared.command, cwd = %prepared.cwd.display(), "spawning shell");
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return UnitOutcome::failed(
                    WORKER_SPAWN_FAILED,
                    format!("{}: {e}", self.settings.shell),
                )
            }
        };

        // Dropping the wait future on cancel drops the child, which kills it.
        let output = tokio::select! {
            result = child.wait_with_output() => match result {
                Ok(output) => output,
                Err(e) => return UnitOutcome::failed("process wait failed", e.to_string()),
            },
            () = ctx.cancel.cancelled() => {
                debug!(command = %prepared.command, "exec cancelled");
                return UnitOutcome::failed("cancelled", "cancelled");
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(exit_code, duration_ms, "exec completed");

        UnitOutcome {
            ok: output.status.success(),
            summary: format!("exit {exit_code}"),
            detail: render_output(
                &String::from_utf8_lossy(&output.stdout),
                &String::from_utf8_lossy(&output.stderr),
                self.settings.max_output_bytes,
            ),
            exit_code: Some(exit_code),
            error: (!output.status.success()).then(|| format!("exit code {exit_code}")),
            ..UnitOutcome::default()
        }
    }
}

/// Combine captured streams, truncating each to `max_bytes`.
pub fn render_output(stdout: &str, stderr: &str, max_bytes: usize) -> String {
    let mut content = String::new();
    if !stdout.is_empty() {
        content.push_str(&truncate(stdout, max_bytes));
    }
    if !stderr.is_empty() {
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str("STDERR:\n");
        content.push_str(&truncate(stderr, max_bytes));
    }
    content
}

fn truncate(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...\n[truncated: {} bytes total]", &text[..end], text.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    use crate::handler::EventSink;

    fn request(raw: serde_json::Value) -> RequestRecord {
        serde_json::from_value(raw).unwrap()
    }

    fn handler(base: &Path) -> SystemHandler {
        SystemHandler::new(SystemSettings::default(), None, base.to_path_buf())
    }

    fn ctx() -> UnitContext {
        UnitContext {
            correlation_id: CorrelationId::from_raw("c"),
            session_dir: std::env::temp_dir(),
            cancel: CancellationToken::new(),
            events: EventSink::new(None, CorrelationId::from_raw("c")),
        }
    }

    #[test]
    fn parse_vocabulary() {
        let ping = request(json!({"version": 1, "type": "ping", "correlationId": "c"}));
        assert_eq!(SystemRequest::parse(&ping).unwrap(), SystemRequest::Ping);

        let exec = request(json!({"version": 1, "type": "exec", "correlationId": "c", "command": "ls", "cwd": "/tmp"}));
        assert_eq!(
            SystemRequest::parse(&exec).unwrap(),
            SystemRequest::Exec {
                command: "ls".into(),
                cwd: Some("/tmp".into())
            }
        );

        let bad = request(json!({"version": 1, "type": "exec", "correlationId": "c", "command": 5}));
        assert!(SystemRequest::parse(&bad).is_err());

        let other = request(json!({"version": 1, "type": "reboot", "correlationId": "c"}));
        assert_eq!(
            SystemRequest::parse(&other).unwrap(),
            SystemRequest::Unsupported("reboot".into())
        );
    }

    #[test]
    fn ping_is_immediate_pong() {
        let dir = tempfile::tempdir().unwrap();
        let ping = request(json!({"version": 1, "type": "ping", "correlationId": "c"}));
        match handler(dir.path()).parse(&ping) {
            Dispatch::Immediate(resp) => {
                assert!(resp.ok);
                assert_eq!(resp.summary.as_deref(), Some("pong"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_exec_is_invalid_request() {
        let dir = tempfile::tempdir().unwrap();
        let exec = request(json!({"version": 1, "type": "exec", "correlationId": "c"}));
        match handler(dir.path()).parse(&exec) {
            Dispatch::Immediate(resp) => {
                assert!(!resp.ok);
                assert_eq!(resp.summary.as_deref(), Some("invalid request"));
                assert!(resp.detail.contains("command"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prepare_rejects_missing_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let err = handler(dir.path())
            .prepare(ExecUnit {
                command: "true".into(),
                cwd: Some("missing".into()),
            })
            .unwrap_err();
        assert_eq!(err.error_kind(), "working_directory");
    }

    #[tokio::test]
    async fn exec_captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path());
        let prepared = h
            .prepare(ExecUnit {
                command: "pwd; echo oops >&2; exit 3".into(),
                cwd: None,
            })
            .unwrap();
        let outcome = h.run(prepared, ctx()).await;
        assert!(!outcome.ok);
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.detail.contains("STDERR:\noops"));
        let canonical = dir.path().canonicalize().unwrap();
        assert!(outcome.detail.contains(&*canonical.to_string_lossy()));
    }

    #[tokio::test]
    async fn exec_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let h = handler(dir.path());
        let prepared = h
            .prepare(ExecUnit {
                command: "sleep 30".into(),
                cwd: None,
            })
            .unwrap();
        let ctx = ctx();
        let cancel = ctx.cancel.clone();
        let started = Instant::now();
        let run = h.run(prepared, ctx);
        cancel.cancel();
        let outcome = run.await;
        assert!(!outcome.ok);
        assert!(started.elapsed().as_secs() < 10);
    }

    #[tokio::test]
    async fn missing_shell_is_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SystemSettings {
            shell: "/nonexistent/shell".into(),
            ..SystemSettings::default()
        };
        let h = SystemHandler::new(settings, None, dir.path().to_path_buf());
        let prepared = h
            .prepare(ExecUnit {
                command: "true".into(),
                cwd: None,
            })
            .unwrap();
        let outcome = h.run(prepared, ctx()).await;
        assert_eq!(outcome.summary, WORKER_SPAWN_FAILED);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let out = render_output("héllo", "", 2);
        assert!(out.starts_with("h..."));
        assert!(out.contains("[truncated: 6 bytes total]"));
    }
}
