//! Offset-tracking reader for append-only JSONL files.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::Stream;
use serde::de::DeserializeOwned;
use switchyard_core::BusRecord;
use tracing::{debug, warn};

use crate::codec::decode_line;
use crate::error::{BusError, Result};
use crate::lines::LineSplitter;

/// Bytes read from disk per step; a long backlog is decoded chunk by chunk.
const READ_CHUNK: usize = 64 * 1024;

/// Tails one bus file from a byte offset.
///
/// `poll` reads everything that was appended before the call, in bounded
/// chunks, and returns the records completed by it. A missing file yields nothing. A file that got
/// shorter than the offset is treated as replaced and read from the start.
#[derive(Debug)]
pub struct JsonlTail<T> {
    path: PathBuf,
    offset: u64,
    splitter: LineSplitter,
    generation: u64,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonlTail<T>
where
    T: DeserializeOwned + BusRecord,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_offset(path, 0)
    }

    /// Resume at a known offset, e.g. the end of a file already consumed.
    pub fn from_offset(path: impl Into<PathBuf>, offset: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            splitter: LineSplitter::new(),
            generation: 0,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far, including any held partial line.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bumped every time the reader restarts at offset 0.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Restart from the beginning of the file.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.splitter.clear();
        self.generation += 1;
    }

    /// Point at a different file and start from its beginning.
    pub fn retarget(&mut self, path: impl Into<PathBuf>) {
        self.path = path.into();
        self.reset();
    }

    pub fn poll(&mut self) -> Result<Vec<T>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(BusError::io(&self.path)(e)),
        };
        let len = file.metadata().map_err(BusError::io(&self.path))?.len();
        if len < self.offset {
            debug!(path = %self.path.display(), len, offset = self.offset, "bus file shrank, rereading");
            self.reset();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))
            .map_err(BusError::io(&self.path))?;
        let mut buf = vec![0u8; READ_CHUNK];
        let mut records = Vec::new();
        while self.offset < len {
            let want = READ_CHUNK.min((len - self.offset) as usize);
            let read = file
                .read(&mut buf[..want])
                .map_err(BusError::io(&self.path))?;
            if read == 0 {
                break;
            }
            self.offset += read as u64;
            records.extend(
                self.splitter
                    .push(&buf[..read])
                    .iter()
                    .filter_map(|line| decode_line(line)),
            );
        }
        Ok(records)
    }

    /// Lazy stream of records, polling the file every `interval`.
    ///
    /// The stream owns the reader; dropping it and building a new tail from
    /// the same offset restarts where it left off.
    pub fn stream(mut self, interval: Duration) -> impl Stream<Item = T>
    where
        T: 'static,
    {
        async_stream::stream! {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                let _ = ticker.tick().await;
                match self.poll() {
                    Ok(records) => {
                        for record in records {
                            yield record;
                        }
                    }
                    Err(e) => warn!(error = %e, "tail poll failed"),
                }
            }
        }
    }
}

/// Read every complete record currently in a file.
pub fn read_records<T>(path: &Path) -> Result<Vec<T>>
where
    T: DeserializeOwned + BusRecord,
{
    JsonlTail::new(path).poll()
}
