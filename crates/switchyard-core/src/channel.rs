use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A bus channel: one runtime or subsystem with its own request/response
/// (and optionally event) log inside every session.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    System,
    Codex,
    #[serde(rename = "opencode")]
    OpenCode,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::System, Channel::Codex, Channel::OpenCode];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Codex => "codex",
            Self::OpenCode => "opencode",
        }
    }

    /// Worker channels stream per-turn events; `system` answers with responses only.
    pub fn has_events(&self) -> bool {
        matches!(self, Self::Codex | Self::OpenCode)
    }

    /// The `type` tag carried by every response on this channel.
    pub fn result_type(&self) -> String {
        format!("{}.result", self.as_str())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "codex" => Ok(Self::Codex),
            "opencode" => Ok(Self::OpenCode),
            other => Err(UnknownChannel(other.to_string())),
        }
    }
}
