//! MCP method and tool handlers.

use std::time::Duration;

use serde_json::{json, Map, Value};
use switchyard_bus::{probe, BusClient, SessionResolver};
use switchyard_core::{Channel, CorrelationId, SessionId};
use switchyard_settings::SwitchyardSettings;
use tracing::{debug, info};

use crate::error::{GatewayError, Result};
use crate::guard::ArtifactGuard;
use crate::rpc::{self, RpcResponse};
use crate::tools::{self, ToolAction, ToolSpec};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "switchyard";

/// Record fields owned by the bus; tool arguments may not override them.
const RESERVED_ARGS: &[&str] = &["version", "type", "correlationId"];

/// Shared state available to all handlers.
pub struct GatewayState {
    pub client: BusClient,
    pub guard: ArtifactGuard,
    pub heartbeat_stale: Duration,
    pub default_list_limit: usize,
}

impl GatewayState {
    pub fn new(
        client: BusClient,
        guard: ArtifactGuard,
        heartbeat_stale: Duration,
        default_list_limit: usize,
    ) -> Self {
        Self {
            client,
            guard,
            heartbeat_stale,
            default_list_limit,
        }
    }

    /// Build from settings. The artifact base directory is created if missing.
    pub fn from_settings(settings: &SwitchyardSettings) -> Result<Self> {
        let base = settings.artifact_base_dir();
        std::fs::create_dir_all(&base)?;
        let guard = ArtifactGuard::new(
            &base,
            settings.gateway.denylist.clone(),
            settings.gateway.max_artifact_bytes,
        )?;
        Ok(Self::new(
            BusClient::new(SessionResolver::new(settings.state_dir())),
            guard,
            Duration::from_millis(settings.executor.heartbeat_stale_ms),
            settings.gateway.default_list_limit,
        ))
    }
}

/// Dispatch an MCP method. `None` for notifications, which get no reply.
pub fn dispatch(
    state: &GatewayState,
    method: &str,
    params: &Value,
    id: Option<Value>,
) -> Option<RpcResponse> {
    if id.is_none() {
        debug!(method, "notification");
        return None;
    }
    Some(match method {
        "initialize" => initialize(params, id),
        "ping" => RpcResponse::success(id, json!({})),
        "tools/list" => RpcResponse::success(id, tools::list_tools()),
        "tools/call" => tools_call(state, params, id),
        _ => RpcResponse::method_not_found(id, method),
    })
}

fn initialize(params: &Value, id: Option<Value>) -> RpcResponse {
    let version = rpc::optional_str(params, "protocolVersion").unwrap_or(PROTOCOL_VERSION);
    info!(protocol_version = version, "client initialized");
    RpcResponse::success(
        id,
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        }),
    )
}

fn tools_call(state: &GatewayState, params: &Value, id: Option<Value>) -> RpcResponse {
    let name = match rpc::require_str(params, "name") {
        Ok(name) => name,
        Err(msg) => return RpcResponse::invalid_params(id, msg),
    };
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match call_tool(state, name, &arguments) {
        Ok(payload) => RpcResponse::success(id, tool_result(&payload, false)),
        Err(e @ GatewayError::UnknownTool(_)) => RpcResponse::error(id, e.rpc_code(), e.to_string()),
        Err(e) => {
            debug!(tool = name, error = %e, "tool call failed");
            RpcResponse::success(id, tool_result(&json!({"error": e.to_string()}), true))
        }
    }
}

/// MCP tool result envelope: one text block holding the JSON payload.
pub fn tool_result(payload: &Value, is_error: bool) -> Value {
    json!({
        "content": [{ "type": "text", "text": payload.to_string() }],
        "isError": is_error,
    })
}

/// Run a tool and return its JSON payload.
pub fn call_tool(state: &GatewayState, name: &str, arguments: &Value) -> Result<Value> {
    let spec = tools::find_tool(name).ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;
    if !arguments.is_object() {
        return Err(GatewayError::InvalidParams("arguments must be an object".into()));
    }
    for key in spec.required {
        let _ = rpc::require_str(arguments, key).map_err(GatewayError::InvalidParams)?;
    }

    match spec.action {
        ToolAction::Forward { channel, kind } => forward(state, spec, channel, kind, arguments),
        ToolAction::ResultGet => result_get(state, arguments),
        ToolAction::ResultList => result_list(state, arguments),
        ToolAction::ArtifactRead => {
            let path = rpc::require_str(arguments, "path").map_err(GatewayError::InvalidParams)?;
            Ok(serde_json::to_value(state.guard.read(path)?)?)
        }
        ToolAction::ExecutorStatus => executor_status(state, arguments),
        ToolAction::SessionCurrent => session_current(state),
    }
}

fn forward(
    state: &GatewayState,
    spec: &ToolSpec,
    channel: Channel,
    kind: &str,
    arguments: &Value,
) -> Result<Value> {
    let mut args = Map::new();
    if let Some(object) = arguments.as_object() {
        for (key, value) in object {
            if !RESERVED_ARGS.contains(&key.as_str()) {
                let _ = args.insert(key.clone(), value.clone());
            }
        }
    }
    let submission = state.client.submit(channel, kind, args)?;
    info!(
        tool = spec.name,
        %channel,
        correlation_id = %submission.correlation_id,
        "request accepted"
    );
    Ok(json!({
        "status": "accepted",
        "correlationId": submission.correlation_id,
        "sessionId": submission.session_id,
        "channel": channel,
    }))
}

fn parse_channel(arguments: &Value) -> Result<Option<Channel>> {
    rpc::optional_str(arguments, "channel")
        .map(|raw| {
            raw.parse::<Channel>()
                .map_err(|e| GatewayError::InvalidParams(e.to_string()))
        })
        .transpose()
}

fn parse_session(arguments: &Value) -> Result<Option<SessionId>> {
    rpc::optional_str(arguments, "sessionId")
        .map(|raw| {
            let id = SessionId::from_raw(raw);
            if id.is_valid() {
                Ok(id)
            } else {
                Err(GatewayError::InvalidParams(format!("invalid sessionId: {raw:?}")))
            }
        })
        .transpose()
}

fn result_get(state: &GatewayState, arguments: &Value) -> Result<Value> {
    let raw = rpc::require_str(arguments, "correlationId").map_err(GatewayError::InvalidParams)?;
    let correlation_id = CorrelationId::from_raw(raw);
    let session = parse_session(arguments)?;
    let pending = || json!({"status": "pending", "correlationId": correlation_id});

    let Some(channel) = parse_channel(arguments)? else {
        return match state.client.find_result(&correlation_id, session.as_ref())? {
            Some(located) => Ok(serde_json::to_value(located)?),
            None => Ok(pending()),
        };
    };
    let Some(session) = session.or_else(|| state.client.current_session()) else {
        let mut value = pending();
        if let Some(object) = value.as_object_mut() {
            let _ = object.insert("channel".into(), json!(channel));
        }
        return Ok(value);
    };
    let resolution = state.client.result_in(&session, channel, &correlation_id)?;
    let mut value = serde_json::to_value(resolution)?;
    if let Some(object) = value.as_object_mut() {
        let _ = object.insert("channel".into(), json!(channel));
        let _ = object.insert("sessionId".into(), json!(session));
        let _ = object
            .entry("correlationId")
            .or_insert_with(|| json!(correlation_id));
    }
    Ok(value)
}

fn result_list(state: &GatewayState, arguments: &Value) -> Result<Value> {
    let channel = parse_channel(arguments)?
        .ok_or_else(|| GatewayError::InvalidParams("Missing required parameter: channel".into()))?;
    let limit = rpc::optional_u64(arguments, "limit")
        .map(|n| n as usize)
        .filter(|n| *n > 0)
        .unwrap_or(state.default_list_limit);
    let action = rpc::optional_str(arguments, "action");
    let session = parse_session(arguments)?.or_else(|| state.client.current_session());
    let results = match &session {
        Some(session) => state.client.results_in(session, channel, limit, action)?,
        None => Vec::new(),
    };
    Ok(json!({ "channel": channel, "sessionId": session, "results": results }))
}

fn executor_status(state: &GatewayState, arguments: &Value) -> Result<Value> {
    let channels: Vec<Channel> = match parse_channel(arguments)? {
        Some(channel) => vec![channel],
        None => Channel::ALL.to_vec(),
    };
    let Some(session_id) = state.client.current_session() else {
        return Ok(json!({ "sessionId": null, "executors": [] }));
    };
    let executors: Vec<_> = channels
        .into_iter()
        .map(|channel| {
            let paths = state.client.sessions().channel_paths(&session_id, channel);
            probe(&paths.heartbeat, channel, state.heartbeat_stale)
        })
        .collect();
    Ok(json!({ "sessionId": session_id, "executors": executors }))
}

fn session_current(state: &GatewayState) -> Result<Value> {
    let sessions = state.client.sessions();
    Ok(match sessions.read_current_session_id() {
        Some(id) => json!({
            "sessionId": id,
            "sessionDir": sessions.session_dir(&id).display().to_string(),
        }),
        None => json!({ "sessionId": null }),
    })
}
