//! Path confinement for artifact reads.
//!
//! A requested path is accepted only when its symlink-resolved form lies
//! under the canonical base directory and its first segment below the base
//! is not denylisted. All checks happen before any bytes are read.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::error::GuardError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactContent {
    pub path: String,
    pub bytes: u64,
    pub truncated: bool,
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct ArtifactGuard {
    base: PathBuf,
    denylist: Vec<String>,
    max_bytes: u64,
}

impl ArtifactGuard {
    /// The base directory must exist; it is canonicalized once here.
    pub fn new(base: &Path, denylist: Vec<String>, max_bytes: u64) -> Result<Self, GuardError> {
        let base = base.canonicalize().map_err(|source| GuardError::Base {
            path: base.to_path_buf(),
            source,
        })?;
        Ok(Self {
            base,
            denylist,
            max_bytes,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve `requested` to a canonical path inside the base.
    pub fn resolve(&self, requested: &str) -> Result<PathBuf, GuardError> {
        let raw = Path::new(requested);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.base.join(raw)
        };

        // Reject lexical escapes up front so missing targets outside the
        // base report as escapes rather than as not-found.
        let lexical = normalize_lexically(&joined)
            .ok_or_else(|| GuardError::OutsideBase(requested.to_string()))?;
        self.check_confined(&lexical, requested)?;

        let canonical = joined.canonicalize().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => GuardError::NotFound(requested.to_string()),
            _ => GuardError::Read {
                path: joined.clone(),
                source: e,
            },
        })?;
        self.check_confined(&canonical, requested)?;
        Ok(canonical)
    }

    /// Read a confined artifact, capped at the configured byte limit.
    pub fn read(&self, requested: &str) -> Result<ArtifactContent, GuardError> {
        let path = match self.resolve(requested) {
            Ok(path) => path,
            Err(e) => {
                warn!(path = requested, kind = e.error_kind(), "artifact read rejected");
                return Err(e);
            }
        };
        let read_err = |source| GuardError::Read {
            path: path.clone(),
            source,
        };

        let meta = std::fs::metadata(&path).map_err(read_err)?;
        if !meta.is_file() {
            return Err(GuardError::NotAFile(requested.to_string()));
        }

        let file = std::fs::File::open(&path).map_err(read_err)?;
        let mut buf = Vec::new();
        let _ = file
            .take(self.max_bytes)
            .read_to_end(&mut buf)
            .map_err(read_err)?;

        Ok(ArtifactContent {
            path: path.display().to_string(),
            bytes: meta.len(),
            truncated: meta.len() > self.max_bytes,
            content: String::from_utf8_lossy(&buf).into_owned(),
        })
    }

    fn check_confined(&self, path: &Path, requested: &str) -> Result<(), GuardError> {
        let relative = path
            .strip_prefix(&self.base)
            .map_err(|_| GuardError::OutsideBase(requested.to_string()))?;
        if let Some(Component::Normal(first)) = relative.components().next() {
            let first = first.to_string_lossy();
            if self.denylist.iter().any(|d| d.as_str() == first) {
                return Err(GuardError::Denied(requested.to_string()));
            }
        }
        Ok(())
    }
}

/// Resolve `.` and `..` without touching the filesystem. `None` when `..`
/// climbs above the root.
fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}
