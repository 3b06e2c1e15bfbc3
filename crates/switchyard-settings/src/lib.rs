//! # switchyard-settings
//!
//! Configuration for the executors, the gateway and the CLI.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SwitchyardSettings::default()`]
//! 2. **User file**: `<state dir>/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SWITCHYARD_*` overrides (highest priority)
//!
//! The state directory itself comes from `SWITCHYARD_STATE_DIR` and falls
//! back to `~/.switchyard`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, default_state_dir, expand_home,
    load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
