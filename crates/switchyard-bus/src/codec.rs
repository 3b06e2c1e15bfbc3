//! JSON line encoding with envelope validation on decode.

use serde::de::DeserializeOwned;
use serde::Serialize;
use switchyard_core::BusRecord;
use tracing::debug;

use crate::error::Result;

/// Decode one line, dropping it when it is not JSON, has the wrong version,
/// or lacks a correlation id.
pub fn decode_line<T>(line: &str) -> Option<T>
where
    T: DeserializeOwned + BusRecord,
{
    let record: T = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(e) => {
            debug!(error = %e, "dropping unparseable bus line");
            return None;
        }
    };
    if let Err(e) = record.check_envelope() {
        debug!(error = %e, kind = e.error_kind(), "dropping bus record");
        return None;
    }
    Some(record)
}

/// Encode a record as `<json>\n`.
pub fn encode_line<T: Serialize>(record: &T) -> Result<String> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}
