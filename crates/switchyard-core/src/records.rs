//! Wire records carried by the bus.
//!
//! Every record is one JSON object per line. Field names are camelCase on the
//! wire; all records carry `version: 1`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::Channel;
use crate::clock::now_rfc3339;
use crate::errors::RecordError;
use crate::ids::{CorrelationId, SessionId};

pub const PROTOCOL_VERSION: u32 = 1;
pub const EVENT_TYPE: &str = "turn.event";

/// Common envelope checks shared by every record read from a bus file.
pub trait BusRecord {
    fn version(&self) -> u32;
    fn correlation_id(&self) -> &CorrelationId;

    fn check_envelope(&self) -> Result<(), RecordError> {
        if self.version() != PROTOCOL_VERSION {
            return Err(RecordError::UnsupportedVersion(self.version()));
        }
        if self.correlation_id().is_blank() {
            return Err(RecordError::MissingCorrelationId);
        }
        Ok(())
    }
}

/// A request appended by a caller. Type-specific arguments stay in `args`
/// until the owning channel parses them into its closed request enum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub version: u32,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub correlation_id: CorrelationId,
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl RequestRecord {
    pub fn new(kind: impl Into<String>, correlation_id: CorrelationId, args: Map<String, Value>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            kind: kind.into(),
            correlation_id,
            args,
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    pub fn arg_bool(&self, key: &str) -> Option<bool> {
        self.args.get(key).and_then(Value::as_bool)
    }
}

impl BusRecord for RequestRecord {
    fn version(&self) -> u32 {
        self.version
    }
    fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

/// The single terminal record for a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub correlation_id: CorrelationId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub artifacts: Map<String, Value>,
    pub started_at: String,
    pub ended_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_changes: Option<Vec<String>>,
}

impl ResponseRecord {
    /// A response with no work behind it (busy, unknown action, invalid
    /// request): start and end share one timestamp.
    pub fn immediate(
        channel: Channel,
        correlation_id: CorrelationId,
        ok: bool,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let now = now_rfc3339();
        Self {
            version: PROTOCOL_VERSION,
            kind: channel.result_type(),
            correlation_id,
            ok,
            action: None,
            summary: Some(summary.into()),
            detail: detail.into(),
            artifacts: Map::new(),
            started_at: now.clone(),
            ended_at: now,
            exit_code: None,
            error: None,
            file_changes: None,
        }
    }
}

impl BusRecord for ResponseRecord {
    fn version(&self) -> u32 {
        self.version
    }
    fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

/// UI-facing event vocabulary. Worker-native shapes are projected into this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Think,
    ToolUse,
    StepStart,
    StepFinish,
    Delta,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub version: u32,
    #[serde(rename = "type")]
    pub record_type: String,
    pub correlation_id: CorrelationId,
    pub at: String,
    pub kind: EventKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl EventRecord {
    pub fn new(
        correlation_id: CorrelationId,
        kind: EventKind,
        message: impl Into<String>,
        tool: Option<String>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            record_type: EVENT_TYPE.to_string(),
            correlation_id,
            at: now_rfc3339(),
            kind,
            message: message.into(),
            tool,
        }
    }
}

impl BusRecord for EventRecord {
    fn version(&self) -> u32 {
        self.version
    }
    fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

/// What the engine's slot is doing, as advertised in the heartbeat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorState {
    Idle,
    Running,
}

/// Overwritten (never appended) readiness file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRecord {
    pub version: u32,
    pub pid: u32,
    pub session_id: SessionId,
    pub channel: Channel,
    pub state: ExecutorState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    pub updated_at: String,
    pub requests_path: String,
    pub responses_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_path: Option<String>,
}

/// Derived answer to "is this correlation id done yet?".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Resolution {
    Pending,
    Completed(ResponseRecord),
}

impl Resolution {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}
