//! Append-only writes. Appending a line is the only mutation bus logs see.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::codec::encode_line;
use crate::error::{BusError, Result};

/// Append one record as a single `write_all` on an append-mode handle.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let line = encode_line(record)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(BusError::io(parent))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(BusError::io(path))?;
    file.write_all(line.as_bytes()).map_err(BusError::io(path))?;
    Ok(())
}

/// Create an empty file if it does not exist. Existing content is untouched.
pub fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(BusError::io(parent))?;
    }
    let _ = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(BusError::io(path))?;
    Ok(())
}

/// Replace a file's content via temp file + rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(BusError::io(parent))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        uuid::Uuid::now_v7().simple()
    ));
    std::fs::write(&tmp, contents).map_err(BusError::io(&tmp))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(BusError::io(path)(e));
    }
    Ok(())
}
