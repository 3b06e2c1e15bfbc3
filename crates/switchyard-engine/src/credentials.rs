//! Worker credential lookup.
//!
//! Priority:
//! 1. The profile's `tokenEnv` variable in the executor's environment
//! 2. `<state_dir>/credentials.json` entry for the channel
//! 3. None (an error when the profile sets `requireToken`)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use switchyard_core::security::{Credential, CredentialSource};
use switchyard_core::Channel;
use switchyard_settings::WorkerProfile;
use tracing::debug;

use crate::error::SetupError;

pub const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Default, Deserialize)]
struct CredentialEntry {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_state_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(CREDENTIALS_FILE))
    }

    pub fn resolve(
        &self,
        channel: Channel,
        profile: &WorkerProfile,
    ) -> Result<Option<Credential>, SetupError> {
        self.resolve_with(channel, profile, |name| std::env::var(name).ok())
    }

    /// Same as [`Self::resolve`] with an injectable environment.
    pub fn resolve_with<F>(
        &self,
        channel: Channel,
        profile: &WorkerProfile,
        lookup: F,
    ) -> Result<Option<Credential>, SetupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_var = profile
            .token_env
            .clone()
            .unwrap_or_else(|| format!("{}_API_KEY", channel.as_str().to_uppercase()));

        if let Some(token) = lookup(&env_var).filter(|t| !t.is_empty()) {
            return Ok(Some(Credential {
                env_var,
                secret: SecretString::from(token),
                source: CredentialSource::Environment,
            }));
        }

        if let Some(token) = self.file_token(channel)? {
            debug!(%channel, "credential from store");
            return Ok(Some(Credential {
                env_var,
                secret: SecretString::from(token),
                source: CredentialSource::CredentialFile,
            }));
        }

        if profile.require_token {
            return Err(SetupError::MissingCredential { channel, env_var });
        }
        Ok(None)
    }

    fn file_token(&self, channel: Channel) -> Result<Option<String>, SetupError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.store_error(e.to_string())),
        };
        let mut entries: HashMap<String, CredentialEntry> =
            serde_json::from_str(&raw).map_err(|e| self.store_error(e.to_string()))?;
        Ok(entries
            .remove(channel.as_str())
            .and_then(|entry| entry.token)
            .filter(|t| !t.is_empty()))
    }

    fn store_error(&self, reason: String) -> SetupError {
        SetupError::CredentialStore {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(require: bool) -> WorkerProfile {
        WorkerProfile {
            bin: "codex".into(),
            token_env: Some("OPENAI_API_KEY".into()),
            require_token: require,
            ..WorkerProfile::default()
        }
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn env_beats_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CREDENTIALS_FILE),
            r#"{"codex": {"token": "from-file"}}"#,
        )
        .unwrap();
        let store = CredentialStore::in_state_dir(dir.path());
        let cred = store
            .resolve_with(Channel::Codex, &profile(false), |name| {
                (name == "OPENAI_API_KEY").then(|| "from-env".to_string())
            })
            .unwrap()
            .unwrap();
        assert_eq!(cred.expose(), "from-env");
        assert_eq!(cred.source, CredentialSource::Environment);
    }

    #[test]
    fn file_used_when_env_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CREDENTIALS_FILE),
            r#"{"codex": {"token": "from-file"}, "opencode": {}}"#,
        )
        .unwrap();
        let store = CredentialStore::in_state_dir(dir.path());
        let cred = store
            .resolve_with(Channel::Codex, &profile(true), no_env)
            .unwrap()
            .unwrap();
        assert_eq!(cred.expose(), "from-file");
        assert_eq!(cred.env_var, "OPENAI_API_KEY");
        assert_eq!(cred.source, CredentialSource::CredentialFile);
    }

    #[test]
    fn missing_is_none_unless_required() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_state_dir(dir.path());
        assert!(store
            .resolve_with(Channel::Codex, &profile(false), no_env)
            .unwrap()
            .is_none());
        let err = store
            .resolve_with(Channel::Codex, &profile(true), no_env)
            .unwrap_err();
        assert_eq!(err.error_kind(), "missing_credential");
    }

    #[test]
    fn default_env_var_derived_from_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_state_dir(dir.path());
        let opencode = WorkerProfile {
            bin: "opencode".into(),
            require_token: true,
            ..WorkerProfile::default()
        };
        let err = store
            .resolve_with(Channel::OpenCode, &opencode, no_env)
            .unwrap_err();
        assert!(err.to_string().contains("OPENCODE_API_KEY"));
    }

    #[test]
    fn corrupt_store_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CREDENTIALS_FILE), "{oops").unwrap();
        let store = CredentialStore::in_state_dir(dir.path());
        let err = store
            .resolve_with(Channel::Codex, &profile(false), no_env)
            .unwrap_err();
        assert_eq!(err.error_kind(), "credential_store");
    }
}
