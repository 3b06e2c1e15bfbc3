use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),
}

impl BusError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| BusError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Serialization(_) => "serialization",
            Self::InvalidSessionId(_) => "invalid_session_id",
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_path() {
        let err = BusError::io(Path::new("/state/x.jsonl"))(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        ));
        assert!(err.to_string().contains("/state/x.jsonl"));
        assert_eq!(err.error_kind(), "io");
    }
}
