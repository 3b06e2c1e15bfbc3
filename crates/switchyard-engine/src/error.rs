use switchyard_bus::BusError;
use switchyard_core::Channel;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("{0}")]
    Internal(String),
}

/// Failures between accepting a unit of work and taking the slot. The
/// request gets a failed response and the executor stays idle.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("working directory {path}: {reason}")]
    WorkingDirectory { path: String, reason: String },

    #[error("no credential for {channel} (set {env_var} or add it to credentials.json)")]
    MissingCredential { channel: Channel, env_var: String },

    #[error("credential store {path}: {reason}")]
    CredentialStore { path: String, reason: String },
}

impl SetupError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::WorkingDirectory { .. } => "working_directory",
            Self::MissingCredential { .. } => "missing_credential",
            Self::CredentialStore { .. } => "credential_store",
        }
    }
}
