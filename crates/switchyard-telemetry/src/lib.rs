//! Tracing setup shared by every switchyard process.
//!
//! Executors and the MCP gateway own stdout (the gateway speaks JSON-RPC on
//! it), so all log output goes to stderr.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "switchyard_bus" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit one JSON object per log line.
    pub json: bool,
    /// Colorize human-readable output.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            ansi: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from the `logging` settings section. Unknown levels fall back to INFO.
    pub fn from_level_str(level: &str, json: bool) -> Self {
        Self {
            log_level: parse_level(level).unwrap_or(Level::INFO),
            json,
            ..Self::default()
        }
    }

    /// Directive string handed to [`EnvFilter`] when RUST_LOG is unset.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Parse a level name (`trace`..`error`, case-insensitive).
pub fn parse_level(raw: &str) -> Option<Level> {
    Level::from_str(raw.trim()).ok()
}

/// Initialize the global subscriber. Call once at startup.
///
/// A second call is a no-op (the first subscriber stays installed), which
/// keeps tests that share a process from panicking.
pub fn init_telemetry(config: TelemetryConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(config.ansi)
            .with_writer(std::io::stderr)
            .with_filter(env_filter)
            .boxed()
    };

    if tracing_subscriber::registry().with(fmt_layer).try_init().is_err() {
        tracing::debug!("telemetry already initialized");
    }
}
