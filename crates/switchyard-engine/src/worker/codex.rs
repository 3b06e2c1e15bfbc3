//! `codex exec --json` runtime.
//!
//! Codex emits one JSON object per line: `thread.started`, `turn.started`,
//! `item.started` / `item.completed` carrying an `item` with its own `type`,
//! then `turn.completed` or `turn.failed`.

use serde_json::Value;
use switchyard_core::{Channel, EventKind};
use switchyard_settings::WorkerProfile;

use super::{headline, Invocation, Phase, Projected, TurnState, WorkerCommand, WorkerRuntime};

const MESSAGE_CHARS: usize = 200;

pub struct CodexRuntime {
    profile: WorkerProfile,
}

impl CodexRuntime {
    pub fn new(profile: WorkerProfile) -> Self {
        Self { profile }
    }
}

impl WorkerRuntime for CodexRuntime {
    fn channel(&self) -> Channel {
        Channel::Codex
    }

    fn command(&self, invocation: Invocation<'_>) -> WorkerCommand {
        let mut args: Vec<String> = vec![
            "exec".into(),
            "--json".into(),
            "--skip-git-repo-check".into(),
            "-C".into(),
            invocation.cwd.display().to_string(),
        ];
        if let Some(model) = invocation.model.or(self.profile.model.as_deref()) {
            args.push("--model".into());
            args.push(model.into());
        }
        args.push("--sandbox".into());
        args.push(
            match invocation.phase {
                Phase::Think => "read-only",
                Phase::Run => "workspace-write",
            }
            .into(),
        );
        args.extend(self.profile.extra_args.iter().cloned());
        args.push(invocation.prompt.into());

        WorkerCommand {
            program: self.profile.bin.clone(),
            args,
            cwd: invocation.cwd.to_path_buf(),
            env: Vec::new(),
        }
    }

    fn project(&self, line: &Value, turn: &mut TurnState) -> Vec<Projected> {
        let kind = line["type"].as_str().unwrap_or_default();
        match kind {
            "thread.started" => {
                let thread = line["thread_id"].as_str().unwrap_or("unknown");
                vec![Projected::new(EventKind::Info, format!("thread {thread}"))]
            }
            "turn.started" => vec![Projected::new(EventKind::StepStart, "turn started")],
            "turn.completed" => {
                let usage = &line["usage"];
                let message = match (usage["input_tokens"].as_u64(), usage["output_tokens"].as_u64()) {
                    (Some(input), Some(output)) => {
                        format!("turn completed ({input} in / {output} out tokens)")
                    }
                    _ => "turn completed".to_string(),
                };
                vec![Projected::new(EventKind::StepFinish, message)]
            }
            "turn.failed" => {
                let message = line["error"]["message"]
                    .as_str()
                    .unwrap_or("turn failed")
                    .to_string();
                turn.failure = Some(message.clone());
                vec![Projected::new(EventKind::Error, message)]
            }
            "error" => {
                let message = line["message"].as_str().unwrap_or("error").to_string();
                turn.failure = Some(message.clone());
                vec![Projected::new(EventKind::Error, message)]
            }
            "item.started" => project_item_started(&line["item"]),
            "item.completed" => project_item_completed(&line["item"], turn),
            _ => Vec::new(),
        }
    }
}

fn project_item_started(item: &Value) -> Vec<Projected> {
    match item["type"].as_str() {
        Some("command_execution") => {
            let command = item["command"].as_str().unwrap_or_default();
            vec![Projected::tool("shell", headline(command, MESSAGE_CHARS))]
        }
        _ => Vec::new(),
    }
}

fn project_item_completed(item: &Value, turn: &mut TurnState) -> Vec<Projected> {
    match item["type"].as_str() {
        Some("agent_message") => {
            let text = item["text"].as_str().unwrap_or_default();
            turn.last_message = Some(text.to_string());
            vec![Projected::new(EventKind::Delta, text)]
        }
        Some("reasoning") => {
            let text = item["text"].as_str().unwrap_or_default();
            vec![Projected::new(EventKind::Think, headline(text, MESSAGE_CHARS))]
        }
        Some("file_change") => {
            let mut paths = Vec::new();
            if let Some(changes) = item["changes"].as_array() {
                for change in changes {
                    if let Some(path) = change["path"].as_str() {
                        turn.add_file_change(path);
                        paths.push(path.to_string());
                    }
                }
            }
            vec![Projected::tool("apply_patch", paths.join(", "))]
        }
        Some("mcp_tool_call") => {
            let server = item["server"].as_str().unwrap_or("mcp");
            let tool = item["tool"].as_str().unwrap_or("tool");
            vec![Projected::tool(format!("{server}.{tool}"), format!("{server}.{tool}"))]
        }
        Some("web_search") => {
            let query = item["query"].as_str().unwrap_or_default();
            vec![Projected::tool("web_search", headline(query, MESSAGE_CHARS))]
        }
        Some("error") => {
            let message = item["message"].as_str().unwrap_or("error");
            vec![Projected::new(EventKind::Error, message)]
        }
        _ => Vec::new(),
    }
}
