//! The seam between the generic executor loop and a channel's semantics.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use switchyard_bus::append_record;
use switchyard_core::{Channel, CorrelationId, EventKind, EventRecord, RequestRecord, ResponseRecord};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SetupError;

pub const UNKNOWN_ACTION: &str = "unknown action";
pub const INVALID_REQUEST: &str = "invalid request";

/// What the executor should do with one request.
#[derive(Debug)]
pub enum Dispatch<U> {
    /// A unit of work that needs the slot.
    Unit(U),
    /// Cancel the running unit if its id is `target`. Never answered.
    Cancel { target: CorrelationId },
    /// Report executor state.
    Status,
    /// Answer right away without touching the slot.
    Immediate(ResponseRecord),
}

impl<U> Dispatch<U> {
    pub fn unknown_action(channel: Channel, request: &RequestRecord) -> Self {
        Self::Immediate(ResponseRecord::immediate(
            channel,
            request.correlation_id.clone(),
            false,
            UNKNOWN_ACTION,
            format!("{channel} does not handle {:?}", request.kind),
        ))
    }

    pub fn invalid(channel: Channel, request: &RequestRecord, reason: impl Into<String>) -> Self {
        Self::Immediate(ResponseRecord::immediate(
            channel,
            request.correlation_id.clone(),
            false,
            INVALID_REQUEST,
            reason,
        ))
    }
}

/// Parse `cancel {target?}`: the target defaults to the request's own id.
pub fn cancel_target(request: &RequestRecord) -> CorrelationId {
    request
        .arg_str("target")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(CorrelationId::from_raw)
        .unwrap_or_else(|| request.correlation_id.clone())
}

/// Appends `turn.event` records for one unit. Writes are synchronous so an
/// event is on disk before the unit can finish.
#[derive(Clone, Debug)]
pub struct EventSink {
    path: Option<PathBuf>,
    correlation_id: CorrelationId,
    force_kind: Option<EventKind>,
}

impl EventSink {
    pub fn new(path: Option<PathBuf>, correlation_id: CorrelationId) -> Self {
        Self {
            path,
            correlation_id,
            force_kind: None,
        }
    }

    /// A sink that relabels every event as `kind` (the think phase).
    pub fn forced(&self, kind: EventKind) -> Self {
        Self {
            force_kind: Some(kind),
            ..self.clone()
        }
    }

    pub fn emit(&self, kind: EventKind, message: impl Into<String>, tool: Option<String>) {
        let Some(path) = &self.path else {
            return;
        };
        let kind = self.force_kind.unwrap_or(kind);
        let record = EventRecord::new(self.correlation_id.clone(), kind, message, tool);
        if let Err(e) = append_record(path, &record) {
            warn!(error = %e, correlation_id = %self.correlation_id, "event append failed");
        }
    }
}

/// Everything a running unit gets from the executor.
#[derive(Clone, Debug)]
pub struct UnitContext {
    pub correlation_id: CorrelationId,
    pub session_dir: PathBuf,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

/// Result of a finished unit, before the executor stamps envelope fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnitOutcome {
    pub ok: bool,
    pub summary: String,
    pub detail: String,
    pub exit_code: Option<i32>,
    pub error: Option<String>,
    pub artifacts: Map<String, Value>,
    pub file_changes: Option<Vec<String>>,
}

impl UnitOutcome {
    pub fn failed(summary: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            ok: false,
            summary: summary.into(),
            detail: error.clone(),
            error: Some(error),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait ChannelHandler: Send + Sync + 'static {
    /// A validated unit-of-work request.
    type Unit: Send + 'static;
    /// A unit with its environment resolved, ready to run.
    type Prepared: Send + 'static;

    fn channel(&self) -> Channel;

    /// Classify a request. Unknown types and bad arguments become
    /// `Dispatch::Immediate` failures.
    fn parse(&self, request: &RequestRecord) -> Dispatch<Self::Unit>;

    /// Resolve working directory, credentials and the like. Runs before the
    /// slot is taken.
    fn prepare(&self, unit: Self::Unit) -> Result<Self::Prepared, SetupError>;

    /// Execute the unit. Must return promptly once `ctx.cancel` fires.
    async fn run(&self, prepared: Self::Prepared, ctx: UnitContext) -> UnitOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_bus::read_records;

    fn request(raw: Value) -> RequestRecord {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn cancel_target_defaults_to_own_id() {
        let own = request(json!({"version": 1, "type": "cancel", "correlationId": "c1"}));
        assert_eq!(cancel_target(&own).as_str(), "c1");

        let other = request(json!({"version": 1, "type": "cancel", "correlationId": "c2", "target": "c1"}));
        assert_eq!(cancel_target(&other).as_str(), "c1");

        let blank = request(json!({"version": 1, "type": "cancel", "correlationId": "c3", "target": " "}));
        assert_eq!(cancel_target(&blank).as_str(), "c3");
    }

    #[test]
    fn unknown_action_response() {
        let req = request(json!({"version": 1, "type": "dance", "correlationId": "c"}));
        match Dispatch::<()>::unknown_action(Channel::System, &req) {
            Dispatch::Immediate(resp) => {
                assert!(!resp.ok);
                assert_eq!(resp.summary.as_deref(), Some(UNKNOWN_ACTION));
                assert_eq!(resp.kind, "system.result");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sink_forces_kind_and_skips_without_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codex.events.jsonl");
        let sink = EventSink::new(Some(path.clone()), CorrelationId::from_raw("c"));
        sink.emit(EventKind::Delta, "hello", None);
        sink.forced(EventKind::Think)
            .emit(EventKind::ToolUse, "ls", Some("shell".into()));

        let events: Vec<EventRecord> = read_records(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Delta);
        assert_eq!(events[1].kind, EventKind::Think);
        assert_eq!(events[1].tool.as_deref(), Some("shell"));

        EventSink::new(None, CorrelationId::from_raw("c")).emit(EventKind::Info, "x", None);
    }

    #[test]
    fn failed_outcome_carries_error_in_detail() {
        let outcome = UnitOutcome::failed("setup failed", "no such dir");
        assert!(!outcome.ok);
        assert_eq!(outcome.detail, "no such dir");
        assert_eq!(outcome.error.as_deref(), Some("no such dir"));
    }
}
