//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! `settings.json` only needs the keys it overrides.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "executor": { "pollIntervalMs": 100 },
///   "workers": { "codex": { "bin": "/opt/codex/bin/codex" } }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchyardSettings {
    /// Root of all state: session pointer, session logs, credentials.
    /// `~` is expanded. Empty means [`crate::default_state_dir`].
    pub state_dir: String,
    pub executor: ExecutorSettings,
    pub workers: WorkerSettings,
    pub system: SystemSettings,
    pub gateway: GatewaySettings,
    pub logging: LoggingSettings,
}

impl Default for SwitchyardSettings {
    fn default() -> Self {
        Self {
            state_dir: String::new(),
            executor: ExecutorSettings::default(),
            workers: WorkerSettings::default(),
            system: SystemSettings::default(),
            gateway: GatewaySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SwitchyardSettings {
    /// Resolved state directory.
    pub fn state_dir(&self) -> PathBuf {
        if self.state_dir.trim().is_empty() {
            crate::loader::default_state_dir()
        } else {
            PathBuf::from(crate::loader::expand_home(&self.state_dir))
        }
    }

    /// Base directory for gateway artifact reads (defaults to the state dir).
    pub fn artifact_base_dir(&self) -> PathBuf {
        match &self.gateway.artifact_base_dir {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(crate::loader::expand_home(dir)),
            _ => self.state_dir(),
        }
    }

    /// Reject values the executor loop or the gateway cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        use crate::SettingsError;

        let nonzero = [
            ("executor.pollIntervalMs", self.executor.poll_interval_ms),
            ("executor.heartbeatIntervalMs", self.executor.heartbeat_interval_ms),
            ("gateway.maxArtifactBytes", self.gateway.max_artifact_bytes),
            ("gateway.defaultListLimit", self.gateway.default_list_limit as u64),
        ];
        if let Some((field, _)) = nonzero.into_iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::Zero { field });
        }
        if self.executor.heartbeat_stale_ms <= self.executor.heartbeat_interval_ms {
            return Err(SettingsError::StaleWindow {
                stale_ms: self.executor.heartbeat_stale_ms,
                interval_ms: self.executor.heartbeat_interval_ms,
            });
        }
        Ok(())
    }
}

/// Engine loop timing and bus housekeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorSettings {
    /// Poll tick for the request log and session pointer.
    pub poll_interval_ms: u64,
    /// How often the heartbeat file is rewritten.
    pub heartbeat_interval_ms: u64,
    /// Heartbeats older than this are reported as stale.
    pub heartbeat_stale_ms: u64,
    /// Bus files above this size trigger a rotation warning.
    pub bus_warn_bytes: u64,
    /// Working directory for requests that do not name one.
    pub default_cwd: Option<String>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            heartbeat_interval_ms: 1000,
            heartbeat_stale_ms: 5000,
            bus_warn_bytes: 64 * 1024 * 1024,
            default_cwd: None,
        }
    }
}

/// Per-runtime worker launch settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerSettings {
    pub codex: WorkerProfile,
    pub opencode: WorkerProfile,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            codex: WorkerProfile {
                bin: "codex".into(),
                token_env: Some("OPENAI_API_KEY".into()),
                ..WorkerProfile::default()
            },
            opencode: WorkerProfile {
                bin: "opencode".into(),
                ..WorkerProfile::default()
            },
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerProfile {
    /// Executable name or path.
    pub bin: String,
    /// Model passed to the worker when the request does not pick one.
    pub model: Option<String>,
    /// Environment variable the worker reads its token from.
    pub token_env: Option<String>,
    /// Fail the request before spawning when no token can be resolved.
    pub require_token: bool,
    /// Extra arguments appended before the prompt.
    pub extra_args: Vec<String>,
}

/// `system` channel settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemSettings {
    /// Shell used for `exec` requests (invoked as `<shell> -c <command>`).
    pub shell: String,
    /// Cap on captured stdout/stderr per stream.
    pub max_output_bytes: usize,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            shell: "bash".into(),
            max_output_bytes: 1_000_000,
        }
    }
}

/// MCP gateway settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Artifact reads are confined to this directory.
    pub artifact_base_dir: Option<String>,
    /// First path segments (relative to the base) that are never readable.
    pub denylist: Vec<String>,
    pub max_artifact_bytes: u64,
    pub default_list_limit: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            artifact_base_dir: None,
            denylist: [
                ".ssh",
                ".gnupg",
                ".aws",
                ".config",
                ".env",
                "credentials",
                "credentials.json",
                "secrets",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_artifact_bytes: 1024 * 1024,
            default_list_limit: 20,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}
