//! Spawn a worker, stream its stdout through the projector, kill on cancel.

use std::process::Stdio;

use serde_json::Value;
use switchyard_bus::LineSplitter;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{TurnState, WorkerCommand, WorkerRuntime};
use crate::handler::EventSink;

const STDERR_TAIL_BYTES: usize = 4096;

/// Result of one worker invocation that got as far as spawning.
#[derive(Debug, Default)]
pub struct WorkerRun {
    pub exit_code: Option<i32>,
    pub cancelled: bool,
    pub stderr_tail: String,
    pub turn: TurnState,
}

impl WorkerRun {
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.exit_code == Some(0) && self.turn.failure.is_none()
    }

    /// Best available explanation for an unsuccessful run.
    pub fn failure_reason(&self) -> String {
        if self.cancelled {
            return "cancelled".into();
        }
        if let Some(failure) = &self.turn.failure {
            return failure.clone();
        }
        let stderr = self.stderr_tail.trim();
        match (self.exit_code, stderr.is_empty()) {
            (Some(code), true) => format!("worker exited with code {code}"),
            (Some(code), false) => format!("worker exited with code {code}: {stderr}"),
            (None, true) => "worker terminated by signal".into(),
            (None, false) => format!("worker terminated by signal: {stderr}"),
        }
    }
}

/// Run `command` to completion (or cancellation), emitting projected events
/// as stdout lines arrive. Lines that are not JSON are ignored.
///
/// Only a spawn failure is an `Err`; everything after that is reported in
/// the returned [`WorkerRun`].
pub async fn run_worker<R: WorkerRuntime + ?Sized>(
    command: &WorkerCommand,
    runtime: &R,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> std::io::Result<WorkerRun> {
    let mut cmd = tokio::process::Command::new(&command.program);
    let _ = cmd
        .args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &command.env {
        let _ = cmd.env(key, value);
    }

    debug!(program = %command.program, cwd = %command.cwd.display(), "spawning worker");
    let mut child = cmd.spawn()?;

    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES)));
    let Some(mut stdout) = child.stdout.take() else {
        return Err(std::io::Error::other("worker stdout not captured"));
    };

    let mut run = WorkerRun::default();
    let mut splitter = LineSplitter::new();
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                run.cancelled = true;
                break;
            }
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    for line in splitter.push(&buf[..n]) {
                        handle_line(&line, runtime, sink, &mut run.turn);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "worker stdout read failed");
                    break;
                }
            },
        }
    }

    if run.cancelled {
        debug!(program = %command.program, "killing cancelled worker");
        if let Err(e) = child.kill().await {
            warn!(error = %e, "worker kill failed");
        }
    } else {
        if let Some(line) = splitter.finish() {
            handle_line(&line, runtime, sink, &mut run.turn);
        }
        let status = tokio::select! {
            status = child.wait() => Some(status),
            () = cancel.cancelled() => None,
        };
        match status {
            Some(Ok(status)) => run.exit_code = status.code(),
            Some(Err(e)) => warn!(error = %e, "worker wait failed"),
            None => {
                run.cancelled = true;
                let _ = child.kill().await;
            }
        }
    }

    if let Some(task) = stderr_task {
        if run.cancelled {
            task.abort();
        } else if let Ok(tail) = task.await {
            run.stderr_tail = tail;
        }
    }

    debug!(exit_code = ?run.exit_code, cancelled = run.cancelled, "worker finished");
    Ok(run)
}

fn handle_line<R: WorkerRuntime + ?Sized>(
    line: &str,
    runtime: &R,
    sink: &EventSink,
    turn: &mut TurnState,
) {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(_) => {
            debug!(line, "ignoring non-JSON worker output");
            return;
        }
    };
    for event in runtime.project(&value, turn) {
        sink.emit(event.kind, event.message, event.tool);
    }
}

/// Read a stream to the end, keeping only the last `max` bytes.
async fn read_tail<S: AsyncRead + Unpin>(mut stream: S, max: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > max {
                    let excess = tail.len() - max;
                    let _ = tail.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}
