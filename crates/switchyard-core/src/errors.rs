/// Why a bus line was not accepted as a record.
///
/// These never surface to callers: the bus drops such lines and only logs
/// the classification at debug level.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),
    #[error("missing correlationId")]
    MissingCorrelationId,
}

impl RecordError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnsupportedVersion(_) => "unsupported_version",
            Self::MissingCorrelationId => "missing_correlation_id",
        }
    }
}
