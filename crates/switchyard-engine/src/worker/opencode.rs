//! `opencode run --format json` runtime.
//!
//! Each line carries a `type` and a `part`; tool calls report their state
//! (with the tool input) under `part.state`.

use serde_json::Value;
use switchyard_core::{Channel, EventKind};
use switchyard_settings::WorkerProfile;

use super::{headline, Invocation, Phase, Projected, TurnState, WorkerCommand, WorkerRuntime};

const MESSAGE_CHARS: usize = 200;
const EDITING_TOOLS: &[&str] = &["edit", "write", "patch", "multiedit"];

pub struct OpenCodeRuntime {
    profile: WorkerProfile,
}

impl OpenCodeRuntime {
    pub fn new(profile: WorkerProfile) -> Self {
        Self { profile }
    }
}

impl WorkerRuntime for OpenCodeRuntime {
    fn channel(&self) -> Channel {
        Channel::OpenCode
    }

    fn command(&self, invocation: Invocation<'_>) -> WorkerCommand {
        let mut args: Vec<String> = vec!["run".into(), "--format".into(), "json".into()];
        if let Some(model) = invocation.model.or(self.profile.model.as_deref()) {
            args.push("--model".into());
            args.push(model.into());
        }
        if invocation.phase == Phase::Think {
            args.push("--agent".into());
            args.push("plan".into());
        }
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
        let part = &line["part"];
        match line["type"].as_str().unwrap_or_default() {
            "step_start" => vec![Projected::new(EventKind::StepStart, "step started")],
            "step_finish" => {
                let reason = part["reason"].as_str().unwrap_or("done");
                vec![Projected::new(EventKind::StepFinish, format!("step finished ({reason})"))]
            }
            "text" => {
                let text = part["text"].as_str().unwrap_or_default();
                if text.is_empty() {
                    return Vec::new();
                }
                turn.last_message = Some(text.to_string());
                vec![Projected::new(EventKind::Delta, text)]
            }
            "reasoning" => {
                let text = part["text"].as_str().unwrap_or_default();
                vec![Projected::new(EventKind::Think, headline(text, MESSAGE_CHARS))]
            }
            "tool_use" => {
                let tool = part["tool"].as_str().unwrap_or("tool");
                let state = &part["state"];
                let input = &state["input"];
                if EDITING_TOOLS.contains(&tool) {
                    if let Some(path) = input["filePath"].as_str() {
                        turn.add_file_change(path);
                    }
                }
                let message = state["title"]
                    .as_str()
                    .or_else(|| input["command"].as_str())
                    .or_else(|| input["filePath"].as_str())
                    .unwrap_or(tool);
                vec![Projected::tool(tool, headline(message, MESSAGE_CHARS))]
            }
            "error" => {
                let error = &line["error"];
                let message = error["data"]["message"]
                    .as_str()
                    .or_else(|| error["message"].as_str())
                    .or_else(|| error["name"].as_str())
                    .unwrap_or("error")
                    .to_string();
                turn.failure = Some(message.clone());
                vec![Projected::new(EventKind::Error, message)]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;

    fn runtime() -> OpenCodeRuntime {
        OpenCodeRuntime::new(WorkerProfile {
            bin: "opencode".into(),
            extra_args: vec!["--print-logs".into()],
            ..WorkerProfile::default()
        })
    }

    #[test]
    fn command_lines_per_phase() {
        let run = runtime().command(Invocation {
            prompt: "fix it",
            cwd: Path::new("/repo"),
            model: Some("anthropic/claude-sonnet-4"),
            phase: Phase::Run,
        });
        assert_eq!(
            run.args,
            vec![
                "run",
                "--format",
                "json",
                "--model",
                "anthropic/claude-sonnet-4",
                "--print-logs",
                "fix it"
            ]
        );
        assert_eq!(run.cwd, Path::new("/repo"));

        let think = runtime().command(Invocation {
            prompt: "fix it",
            cwd: Path::new("/repo"),
            model: None,
            phase: Phase::Think,
        });
        assert!(think.args.windows(2).any(|w| w == ["--agent", "plan"]));
    }

    #[test]
    fn projects_text_tools_and_edits() {
        let rt = runtime();
        let mut turn = TurnState::default();
        let lines = [
            json!({"type": "step_start", "part": {}}),
            json!({"type": "tool_use", "part": {"tool": "bash", "state": {"status": "completed", "input": {"command": "cargo fmt"}}}}),
            json!({"type": "tool_use", "part": {"tool": "edit", "state": {"status": "completed", "title": "src/lib.rs", "input": {"filePath": "src/lib.rs"}}}}),
            json!({"type": "tool_use", "part": {"tool": "write", "state": {"input": {"filePath": "src/lib.rs"}}}}),
            json!({"type": "text", "part": {"text": "All set."}}),
            json!({"type": "step_finish", "part": {"reason": "stop"}}),
        ];
        let events: Vec<Projected> = lines.iter().flat_map(|l| rt.project(l, &mut turn)).collect();
        assert_eq!(events.len(), 6);
        assert_eq!(events[1].tool.as_deref(), Some("bash"));
        assert_eq!(events[1].message, "cargo fmt");
        assert_eq!(events[4].kind, EventKind::Delta);
        assert_eq!(events[5].message, "step finished (stop)");
        assert_eq!(turn.file_changes, vec!["src/lib.rs"]);
        assert_eq!(turn.last_message.as_deref(), Some("All set."));
    }

    #[test]
    fn error_line_marks_failure() {
        let mut turn = TurnState::default();
        let events = runtime().project(
            &json!({"type": "error", "error": {"name": "ProviderAuthError", "data": {"message": "bad key"}}}),
            &mut turn,
        );
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(turn.failure.as_deref(), Some("bad key"));
    }
}
