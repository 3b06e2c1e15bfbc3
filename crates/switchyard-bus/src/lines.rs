//! Newline framing for bus files and worker stdout.

/// Splits a byte stream into complete lines.
///
/// Bytes after the last `\n` are held until more input completes them, so a
/// record that is still being written is never interpreted.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line completed by them.
    ///
    /// A trailing `\r` is stripped and blank lines are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let tail = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        complete
            .split(|b| *b == b'\n')
            .filter_map(normalize)
            .collect()
    }

    /// Flush the dangling partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        normalize(&rest)
    }

    /// Bytes currently held as an incomplete line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

fn normalize(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}
