//! Executor heartbeat file: overwritten in place, liveness judged by mtime.

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use switchyard_core::{Channel, HeartbeatRecord};
use tracing::warn;

use crate::writer::write_atomic;

/// Overwrite the heartbeat. Failures are logged and swallowed; a missed
/// heartbeat only makes the executor look stale.
pub fn write_heartbeat(path: &Path, record: &HeartbeatRecord) -> bool {
    let bytes = match serde_json::to_vec_pretty(record) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "heartbeat serialization failed");
            return false;
        }
    };
    match write_atomic(path, &bytes) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "heartbeat write failed");
            false
        }
    }
}

pub fn read_heartbeat(path: &Path) -> Option<HeartbeatRecord> {
    let raw = std::fs::read(path).ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Time since the heartbeat file was last written.
pub fn heartbeat_age(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}

pub fn is_alive(path: &Path, stale_after: Duration) -> bool {
    heartbeat_age(path).is_some_and(|age| age < stale_after)
}

/// Liveness report for one channel's executor.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStatus {
    pub channel: Channel,
    pub alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<HeartbeatRecord>,
}

pub fn probe(path: &Path, channel: Channel, stale_after: Duration) -> ExecutorStatus {
    let age = heartbeat_age(path);
    ExecutorStatus {
        channel,
        alive: age.is_some_and(|age| age < stale_after),
        age_ms: age.map(|age| age.as_millis() as u64),
        heartbeat: read_heartbeat(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{ExecutorState, SessionId, PROTOCOL_VERSION};

    fn record() -> HeartbeatRecord {
        HeartbeatRecord {
            version: PROTOCOL_VERSION,
            pid: 42,
            session_id: SessionId::from_raw("sess_a"),
            channel: Channel::Codex,
            state: ExecutorState::Idle,
            correlation_id: None,
            updated_at: switchyard_core::clock::now_rfc3339(),
            requests_path: "/r".into(),
            responses_path: "/p".into(),
            events_path: Some("/e".into()),
        }
    }

    #[test]
    fn fresh_heartbeat_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codex.executor.json");
        assert!(!is_alive(&path, Duration::from_secs(5)));
        assert!(write_heartbeat(&path, &record()));
        assert!(is_alive(&path, Duration::from_secs(5)));
        assert_eq!(read_heartbeat(&path).unwrap().pid, 42);
    }

    #[test]
    fn zero_threshold_is_always_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hb.json");
        write_heartbeat(&path, &record());
        assert!(!is_alive(&path, Duration::ZERO));
    }

    #[test]
    fn unwritable_location_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        assert!(!write_heartbeat(&blocker.join("hb.json"), &record()));
    }

    #[test]
    fn probe_missing_heartbeat() {
        let dir = tempfile::tempdir().unwrap();
        let status = probe(&dir.path().join("none"), Channel::System, Duration::from_secs(1));
        assert!(!status.alive);
        assert!(status.heartbeat.is_none());
    }
}
