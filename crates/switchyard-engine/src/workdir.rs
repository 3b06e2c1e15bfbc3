//! Working directory normalisation for units of work.

use std::path::{Path, PathBuf};

use switchyard_settings::expand_home;

use crate::error::SetupError;

/// Resolve the directory a unit runs in.
///
/// Takes the request's `cwd`, else `default`, else the executor's own
/// directory. `~` is expanded, relative paths resolve against `base`, and
/// the result must be an existing directory (symlinks resolved).
pub fn normalize_workdir(
    requested: Option<&str>,
    default: Option<&str>,
    base: &Path,
) -> Result<PathBuf, SetupError> {
    let raw = requested
        .or(default)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let Some(raw) = raw else {
        return Ok(base.to_path_buf());
    };

    let expanded = PathBuf::from(expand_home(raw));
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };

    let fail = |reason: String| SetupError::WorkingDirectory {
        path: raw.to_string(),
        reason,
    };
    let canonical = joined.canonicalize().map_err(|e| fail(e.to_string()))?;
    if !canonical.is_dir() {
        return Err(fail("not a directory".into()));
    }
    Ok(canonical)
}

/// Base directory for relative `cwd` values: the executor's own directory.
pub fn process_base_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_uses_default_then_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        assert_eq!(normalize_workdir(None, None, &base).unwrap(), base);

        std::fs::create_dir(base.join("proj")).unwrap();
        let got = normalize_workdir(None, Some("proj"), &base).unwrap();
        assert_eq!(got, base.join("proj"));
    }

    #[test]
    fn request_wins_over_default() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::create_dir(base.join("a")).unwrap();
        std::fs::create_dir(base.join("b")).unwrap();
        let got = normalize_workdir(Some("b"), Some("a"), &base).unwrap();
        assert_eq!(got, base.join("b"));
    }

    #[test]
    fn dot_segments_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        std::fs::create_dir(base.join("a")).unwrap();
        let got = normalize_workdir(Some("./a/../a/"), None, &base).unwrap();
        assert_eq!(got, base.join("a"));
    }

    #[test]
    fn missing_or_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let err = normalize_workdir(Some("nope"), None, &base).unwrap_err();
        assert_eq!(err.error_kind(), "working_directory");

        std::fs::write(base.join("file"), "x").unwrap();
        let err = normalize_workdir(Some("file"), None, &base).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
