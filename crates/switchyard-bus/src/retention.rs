//! Bus logs are never truncated. Growth is bounded by starting a new session;
//! this module only reports logs that have grown past the warning size.

use std::path::PathBuf;

use tracing::warn;

use crate::paths::ChannelPaths;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OversizeLog {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Logs of `paths` larger than `warn_bytes`, each warn-logged once per call.
pub fn check_log_sizes(paths: &ChannelPaths, warn_bytes: u64) -> Vec<OversizeLog> {
    paths
        .logs()
        .into_iter()
        .filter_map(|path| {
            let bytes = std::fs::metadata(path).ok()?.len();
            (bytes > warn_bytes).then(|| OversizeLog {
                path: path.to_path_buf(),
                bytes,
            })
        })
        .inspect(|log| {
            warn!(
                path = %log.path.display(),
                bytes = log.bytes,
                limit = warn_bytes,
                "bus log is large; start a new session to rotate"
            );
        })
        .collect()
}
