//! Correlation-id lookups over a response log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use switchyard_core::{CorrelationId, Resolution, ResponseRecord};

use crate::error::Result;
use crate::tail::{read_records, JsonlTail};

/// Answers "is this request done?" for one response log.
///
/// `get` keeps an incremental index so repeated polling only reads newly
/// appended bytes. When the same id was answered twice the latest answer wins.
pub struct ResultResolver {
    path: PathBuf,
    index: Mutex<Index>,
}

struct Index {
    tail: JsonlTail<ResponseRecord>,
    generation: u64,
    latest: HashMap<CorrelationId, ResponseRecord>,
}

impl ResultResolver {
    pub fn new(responses_path: impl Into<PathBuf>) -> Self {
        let path = responses_path.into();
        Self {
            index: Mutex::new(Index {
                tail: JsonlTail::new(&path),
                generation: 0,
                latest: HashMap::new(),
            }),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, correlation_id: &CorrelationId) -> Result<Resolution> {
        let mut index = self.index.lock();
        let records = index.tail.poll()?;
        if index.tail.generation() != index.generation {
            index.latest.clear();
            index.generation = index.tail.generation();
        }
        for record in records {
            let _ = index.latest.insert(record.correlation_id.clone(), record);
        }
        Ok(match index.latest.get(correlation_id) {
            Some(record) => Resolution::Completed(record.clone()),
            None => Resolution::Pending,
        })
    }

    /// Last `limit` responses in append order (most recent last), optionally
    /// restricted to one `action`.
    pub fn list(&self, limit: usize, action_filter: Option<&str>) -> Result<Vec<ResponseRecord>> {
        let mut matching: Vec<ResponseRecord> = read_records::<ResponseRecord>(&self.path)?
            .into_iter()
            .filter(|r| action_filter.map_or(true, |action| r.action.as_deref() == Some(action)))
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.split_off(skip))
    }
}
