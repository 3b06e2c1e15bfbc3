use secrecy::{ExposeSecret, SecretString};

/// A worker credential (API key or access token), redacted in Debug output.
#[derive(Clone)]
pub struct Credential {
    /// Environment variable the worker reads the secret from.
    pub env_var: String,
    pub secret: SecretString,
    /// Where the secret was found, for logs.
    pub source: CredentialSource,
}

impl Credential {
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("env_var", &self.env_var)
            .field("secret", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    Environment,
    CredentialFile,
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Environment => f.write_str("environment"),
            Self::CredentialFile => f.write_str("credential_file"),
        }
    }
}
