//! Settings errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The file exists but is not JSON.
    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Valid JSON whose values do not fit the settings types.
    #[error("settings have the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    /// A stale threshold at or below the beat interval would flag every
    /// healthy executor.
    #[error(
        "executor.heartbeatStaleMs ({stale_ms}) must exceed executor.heartbeatIntervalMs ({interval_ms})"
    )]
    StaleWindow { stale_ms: u64, interval_ms: u64 },
}

impl SettingsError {
    /// Settings key the error is about, when there is one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Zero { field } => Some(*field),
            Self::StaleWindow { .. } => Some("executor.heartbeatStaleMs"),
            Self::Read { .. } | Self::Parse { .. } | Self::Shape(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;
