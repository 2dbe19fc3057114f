//! # scout-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`ScoutSettings::default()`])
//! 2. **Settings file** (`~/.scout/settings.json` or an explicit path), deep-merged over defaults
//! 3. **Environment variables** (`SCOUT_*`, `PORT`, `OPENAI_API_KEY`)
//!
//! There is no global instance: the binary loads settings once and hands them
//! to the application context.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings_from_path, load_settings_with_env, settings_path, LoadedSettings,
    SkippedVar,
};
pub use types::*;
