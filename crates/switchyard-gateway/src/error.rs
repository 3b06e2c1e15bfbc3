use std::path::PathBuf;

use switchyard_bus::BusError;

use crate::rpc::{INTERNAL_ERROR, INVALID_PARAMS};

/// Why an artifact read was refused.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("artifact base directory unavailable: {path}: {source}")]
    Base {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("path escapes the artifact directory: {0}")]
    OutsideBase(String),

    #[error("path is in a protected location: {0}")]
    Denied(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("artifact read failed: {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl GuardError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Base { .. } => "base",
            Self::OutsideBase(_) => "outside_base",
            Self::Denied(_) => "denied",
            Self::NotFound(_) => "not_found",
            Self::NotAFile(_) => "not_a_file",
            Self::Read { .. } => "read",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("{0}")]
    InvalidParams(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stdio error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// JSON-RPC error code for failures surfaced as protocol errors.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::InvalidParams(_) | Self::UnknownTool(_) => INVALID_PARAMS,
            _ => INTERNAL_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
