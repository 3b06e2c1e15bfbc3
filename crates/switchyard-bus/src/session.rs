//! Current-session pointer and session directories.
//!
//! The pointer is a one-line file, `<state_dir>/current-session`, replaced
//! atomically. Every reader re-derives the session from it, so switching is
//! just rewriting the file.

use std::path::{Path, PathBuf};

use switchyard_core::{Channel, SessionId};
use tracing::{debug, info};

use crate::error::{BusError, Result};
use crate::paths::ChannelPaths;
use crate::writer::write_atomic;

pub const POINTER_FILE: &str = "current-session";
pub const SESSIONS_DIR: &str = "sessions";

#[derive(Clone, Debug)]
pub struct SessionResolver {
    state_dir: PathBuf,
}

impl SessionResolver {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.state_dir.join(POINTER_FILE)
    }

    /// Current session without creating anything. `None` when the pointer is
    /// missing, blank or unreadable.
    pub fn read_current_session_id(&self) -> Option<SessionId> {
        let raw = std::fs::read_to_string(self.pointer_path()).ok()?;
        let id = SessionId::from_raw(raw.trim());
        if id.is_valid() {
            Some(id)
        } else {
            debug!(pointer = %raw.trim(), "ignoring invalid session pointer");
            None
        }
    }

    /// Current session, creating one if none exists.
    ///
    /// Concurrent callers may both create; the pointer is re-read after the
    /// write so everyone agrees on whoever renamed last.
    pub fn ensure_session_id(&self) -> Result<SessionId> {
        if let Some(id) = self.read_current_session_id() {
            return Ok(id);
        }
        let created = SessionId::new();
        self.write_pointer(&created)?;
        let id = self.read_current_session_id().unwrap_or(created);
        info!(session_id = %id, "session created");
        Ok(id)
    }

    /// Create a fresh session and point at it.
    pub fn new_session(&self) -> Result<SessionId> {
        let id = SessionId::new();
        self.write_pointer(&id)?;
        info!(session_id = %id, "new session");
        Ok(id)
    }

    /// Point at an explicit session id.
    pub fn switch_session(&self, id: &SessionId) -> Result<()> {
        if !id.is_valid() {
            return Err(BusError::InvalidSessionId(id.to_string()));
        }
        self.write_pointer(id)?;
        info!(session_id = %id, "session switched");
        Ok(())
    }

    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.state_dir.join(SESSIONS_DIR).join(id.as_str())
    }

    pub fn channel_paths(&self, id: &SessionId, channel: Channel) -> ChannelPaths {
        ChannelPaths::new(&self.session_dir(id), channel)
    }

    /// Session directories on disk, sorted by name (v7 ids sort by creation).
    pub fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let root = self.state_dir.join(SESSIONS_DIR);
        let entries = match std::fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BusError::io(&root)(e)),
        };
        let mut ids: Vec<SessionId> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .map(|entry| SessionId::from_raw(entry.file_name().to_string_lossy()))
            .filter(SessionId::is_valid)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn write_pointer(&self, id: &SessionId) -> Result<()> {
        write_atomic(&self.pointer_path(), format!("{id}\n").as_bytes())
    }
}
