//! The fixed MCP tool table.

use serde_json::{json, Value};
use switchyard_core::Channel;

/// What a tool call does once its arguments are checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolAction {
    /// Append `(channel, type)` to the current session and return at once.
    Forward { channel: Channel, kind: &'static str },
    ResultGet,
    ResultList,
    ArtifactRead,
    ExecutorStatus,
    SessionCurrent,
}

#[derive(Clone, Copy, Debug)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub action: ToolAction,
    /// String arguments that must be present and non-blank.
    pub required: &'static [&'static str],
}

const fn forward(
    name: &'static str,
    description: &'static str,
    channel: Channel,
    kind: &'static str,
    required: &'static [&'static str],
) -> ToolSpec {
    ToolSpec {
        name,
        description,
        action: ToolAction::Forward { channel, kind },
        required,
    }
}

pub const TOOLS: &[ToolSpec] = &[
    forward(
        "system_exec",
        "Run a shell command on the system executor. Returns a correlationId; poll result_get for the outcome.",
        Channel::System,
        "exec",
        &["command"],
    ),
    forward(
        "system_ping",
        "Ping the system executor. Returns a correlationId.",
        Channel::System,
        "ping",
        &[],
    ),
    forward(
        "codex_turn",
        "Start a codex turn. Returns a correlationId; progress is in the codex event log.",
        Channel::Codex,
        "turn",
        &["prompt"],
    ),
    forward(
        "codex_cancel",
        "Cancel the running codex turn with the given target correlationId.",
        Channel::Codex,
        "cancel",
        &["target"],
    ),
    forward(
        "opencode_turn",
        "Start an opencode turn. Returns a correlationId; progress is in the opencode event log.",
        Channel::OpenCode,
        "turn",
        &["prompt"],
    ),
    forward(
        "opencode_cancel",
        "Cancel the running opencode turn with the given target correlationId.",
        Channel::OpenCode,
        "cancel",
        &["target"],
    ),
    ToolSpec {
        name: "result_get",
        description: "Look up the response for a correlationId, in any session unless sessionId is given. Status is pending until the executor answers.",
        action: ToolAction::ResultGet,
        required: &["correlationId"],
    },
    ToolSpec {
        name: "result_list",
        description: "List the most recent responses on a channel, most recent last.",
        action: ToolAction::ResultList,
        required: &["channel"],
    },
    ToolSpec {
        name: "artifact_read",
        description: "Read an artifact file under the artifact directory.",
        action: ToolAction::ArtifactRead,
        required: &["path"],
    },
    ToolSpec {
        name: "executor_status",
        description: "Report executor liveness from heartbeat files.",
        action: ToolAction::ExecutorStatus,
        required: &[],
    },
    ToolSpec {
        name: "session_current",
        description: "Report the current session id and directory.",
        action: ToolAction::SessionCurrent,
        required: &[],
    },
];

pub fn find_tool(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

fn input_schema(spec: &ToolSpec) -> Value {
    let properties = match spec.action {
        ToolAction::Forward { kind: "exec", .. } => json!({
            "command": {"type": "string"},
            "cwd": {"type": "string"},
        }),
        ToolAction::Forward { kind: "turn", .. } => json!({
            "prompt": {"type": "string"},
            "cwd": {"type": "string"},
            "think": {"type": "boolean", "description": "Plan read-only first, then run with the plan."},
            "model": {"type": "string"},
        }),
        ToolAction::Forward { kind: "cancel", .. } => json!({
            "target": {"type": "string", "description": "correlationId of the running turn"},
        }),
        ToolAction::Forward { .. } | ToolAction::SessionCurrent => json!({}),
        ToolAction::ResultGet => json!({
            "correlationId": {"type": "string"},
            "channel": {"type": "string", "enum": ["system", "codex", "opencode"]},
            "sessionId": {"type": "string", "description": "Session the request was accepted in; defaults to searching all sessions, newest first."},
        }),
        ToolAction::ResultList => json!({
            "channel": {"type": "string", "enum": ["system", "codex", "opencode"]},
            "sessionId": {"type": "string", "description": "Defaults to the current session."},
            "limit": {"type": "integer", "minimum": 1},
            "action": {"type": "string"},
        }),
        ToolAction::ArtifactRead => json!({
            "path": {"type": "string"},
        }),
        ToolAction::ExecutorStatus => json!({
            "channel": {"type": "string", "enum": ["system", "codex", "opencode"]},
        }),
    };
    json!({
        "type": "object",
        "properties": properties,
        "required": spec.required,
    })
}

/// `tools/list` result.
pub fn list_tools() -> Value {
    let tools: Vec<Value> = TOOLS
        .iter()
        .map(|spec| {
            json!({
                "name": spec.name,
                "description": spec.description,
                "inputSchema": input_schema(spec),
            })
        })
        .collect();
    json!({ "tools": tools })
}
