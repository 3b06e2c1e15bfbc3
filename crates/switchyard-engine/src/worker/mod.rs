//! Worker runtimes: external coding-assistant CLIs driven one turn at a time.
//!
//! A runtime knows how to build its command line and how to project its
//! native JSONL output into the bus event vocabulary. Everything else
//! (spawning, cancellation, think/run phasing, artifacts) is shared.

pub mod codex;
pub mod handler;
pub mod opencode;
pub mod process;

use std::path::{Path, PathBuf};

use serde_json::Value;
use switchyard_core::{Channel, EventKind};

pub use codex::CodexRuntime;
pub use handler::WorkerHandler;
pub use opencode::OpenCodeRuntime;

/// Which half of a phased turn is running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Restricted, read-only planning pass.
    Think,
    /// The real turn, allowed to edit the workspace.
    Run,
}

#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    pub prompt: &'a str,
    pub cwd: &'a Path,
    pub model: Option<&'a str>,
    pub phase: Phase,
}

/// A fully resolved command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

/// One bus event derived from a worker line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Projected {
    pub kind: EventKind,
    pub message: String,
    pub tool: Option<String>,
}

impl Projected {
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            tool: None,
        }
    }

    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::ToolUse,
            message: message.into(),
            tool: Some(tool.into()),
        }
    }
}

/// What a turn has produced so far, beyond the event stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnState {
    pub last_message: Option<String>,
    /// Changed paths, deduplicated, in first-seen order.
    pub file_changes: Vec<String>,
    /// Failure reported by the worker itself, independent of exit status.
    pub failure: Option<String>,
}

impl TurnState {
    pub fn add_file_change(&mut self, path: &str) {
        let path = path.trim();
        if !path.is_empty() && !self.file_changes.iter().any(|p| p == path) {
            self.file_changes.push(path.to_string());
        }
    }

    pub fn merge_file_changes(&mut self, other: &[String]) {
        for path in other {
            self.add_file_change(path);
        }
    }
}

pub trait WorkerRuntime: Send + Sync + 'static {
    fn channel(&self) -> Channel;

    fn command(&self, invocation: Invocation<'_>) -> WorkerCommand;

    /// Project one parsed stdout line. May record file changes, the final
    /// message or a failure on `turn`.
    fn project(&self, line: &Value, turn: &mut TurnState) -> Vec<Projected>;
}

/// First line of a possibly multi-line string, trimmed and capped.
pub(crate) fn headline(text: &str, max_chars: usize) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first.chars().count() <= max_chars {
        first.to_string()
    } else {
        let cut: String = first.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
