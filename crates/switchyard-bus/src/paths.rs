//! File layout of a session directory.

use std::path::{Path, PathBuf};

use switchyard_core::{Channel, CorrelationId};

use crate::error::Result;
use crate::writer::touch;

/// Bus files for one channel inside one session directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelPaths {
    pub channel: Channel,
    pub session_dir: PathBuf,
    pub requests: PathBuf,
    pub responses: PathBuf,
    /// Only channels that run workers carry an event log.
    pub events: Option<PathBuf>,
    pub heartbeat: PathBuf,
}

impl ChannelPaths {
    pub fn new(session_dir: &Path, channel: Channel) -> Self {
        let name = channel.as_str();
        Self {
            channel,
            session_dir: session_dir.to_path_buf(),
            requests: session_dir.join(format!("{name}.requests.jsonl")),
            responses: session_dir.join(format!("{name}.responses.jsonl")),
            events: channel
                .has_events()
                .then(|| session_dir.join(format!("{name}.events.jsonl"))),
            heartbeat: session_dir.join(format!("{name}.executor.json")),
        }
    }

    /// Create the session directory and the append-only files.
    pub fn ensure(&self) -> Result<()> {
        touch(&self.requests)?;
        touch(&self.responses)?;
        if let Some(events) = &self.events {
            touch(events)?;
        }
        Ok(())
    }

    /// All append-only files of this channel.
    pub fn logs(&self) -> Vec<&Path> {
        let mut logs = vec![self.requests.as_path(), self.responses.as_path()];
        if let Some(events) = &self.events {
            logs.push(events.as_path());
        }
        logs
    }

    /// Per-request artifact directory, keyed by a filesystem-safe id.
    pub fn artifacts_dir(&self, correlation_id: &CorrelationId) -> PathBuf {
        artifacts_dir(&self.session_dir, correlation_id)
    }
}

pub fn artifacts_dir(session_dir: &Path, correlation_id: &CorrelationId) -> PathBuf {
    let stem = correlation_id.file_stem();
    let stem = if stem.is_empty() { "_".to_string() } else { stem };
    session_dir.join("artifacts").join(stem)
}
