//! Layered settings loading.
//!
//! Compiled defaults, then the JSON file deep-merged on top, then environment
//! variables, then [`validate`].

use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{ProviderKind, ScoutSettings};

/// `~/.scout/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".scout").join("settings.json")
}

/// An environment variable that was set but could not be applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedVar {
    pub key: &'static str,
    pub value: String,
}

/// Loaded settings plus the environment overrides that were ignored.
///
/// Loading happens before logging is up, so skipped variables are handed
/// back for the caller to report.
#[derive(Debug)]
pub struct LoadedSettings {
    pub settings: ScoutSettings,
    pub skipped: Vec<SkippedVar>,
}

/// Load from `path` with process environment overrides. A missing file
/// yields defaults.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    load_settings_with_env(path, |name| std::env::var(name).ok())
}

/// Same as [`load_settings_from_path`] but variables come from `env`.
pub fn load_settings_with_env<F>(path: &Path, env: F) -> Result<LoadedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut layered = serde_json::to_value(ScoutSettings::default())?;
    if let Some(file_layer) = read_file_layer(path)? {
        layered = deep_merge(layered, file_layer);
    }

    let mut settings: ScoutSettings = serde_json::from_value(layered)?;
    let skipped = apply_env_overrides_with(&mut settings, env);
    validate(&settings)?;
    Ok(LoadedSettings { settings, skipped })
}

fn read_file_layer(path: &Path) -> Result<Option<Value>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "settings file found");
            Ok(Some(serde_json::from_str(&content)?))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            Ok(None)
        }
        Err(source) => Err(SettingsError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Merge `overlay` into `base`. Objects merge key by key, anything else in
/// the overlay replaces the base value, and `null` leaves the base untouched.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (base, Value::Null) => base,
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None if value.is_null() => continue,
                    None => value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `SCOUT_*`, `PORT` and `OPENAI_API_KEY`. Unparseable values are
/// left out and returned.
pub fn apply_env_overrides_with<F>(settings: &mut ScoutSettings, env: F) -> Vec<SkippedVar>
where
    F: Fn(&str) -> Option<String>,
{
    let mut vars = EnvVars {
        lookup: env,
        skipped: Vec::new(),
    };
    let server = &mut settings.server;
    let provider = &mut settings.provider;

    if let Some(v) = vars.text("SCOUT_HOST") {
        server.host = v;
    }
    // SCOUT_PORT is read second so it wins over the hosting platform's PORT.
    if let Some(v) = vars.number("PORT", 0..=u16::MAX) {
        server.port = v;
    }
    if let Some(v) = vars.number("SCOUT_PORT", 0..=u16::MAX) {
        server.port = v;
    }
    if let Some(v) = vars.text("SCOUT_CORS_ORIGINS") {
        server.cors_origins = split_list(&v);
    }

    if let Some(kind) = vars.named::<ProviderKind>("SCOUT_PROVIDER") {
        provider.kind = kind;
    }
    if let Some(v) = vars.text("SCOUT_PROVIDER_URL") {
        provider.base_url = v;
    }
    if let Some(v) = vars.text("SCOUT_MODEL") {
        provider.model = v;
    }
    if let Some(v) = vars.text("OPENAI_API_KEY") {
        provider.api_key = Some(v);
    }
    if let Some(v) = vars.text("SCOUT_SYSTEM_PROMPT") {
        provider.system_prompt = v;
    }
    if let Some(v) = vars.number("SCOUT_REQUEST_TIMEOUT_SECS", 1..=3600) {
        provider.request_timeout_secs = v;
    }
    if let Some(v) = vars.number("SCOUT_IDLE_TIMEOUT_SECS", 1..=3600) {
        provider.idle_timeout_secs = v;
    }

    if let Some(v) = vars.text("SCOUT_ARTIFACT_RULES") {
        settings.artifacts.rules_path = Some(v);
    }

    if let Some(v) = vars.text("SCOUT_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = vars.flag("SCOUT_LOG_JSON") {
        settings.logging.json = v;
    }
    vars.skipped
}

/// Reject settings the server cannot run with.
pub fn validate(settings: &ScoutSettings) -> Result<()> {
    let server = &settings.server;
    let invalid = |key, reason| Err(SettingsError::InvalidValue { key, reason });

    if server.max_send_queue == 0 {
        return invalid("server.maxSendQueue", "must be at least 1");
    }
    if server.heartbeat_interval_secs == 0 {
        return invalid("server.heartbeatIntervalSecs", "must be at least 1");
    }
    if server.client_timeout_secs <= server.heartbeat_interval_secs {
        return invalid("server.clientTimeoutSecs", "must exceed the heartbeat interval");
    }
    if settings.provider.request_timeout_secs == 0 {
        return invalid("provider.requestTimeoutSecs", "must be at least 1");
    }
    if settings.provider.idle_timeout_secs == 0 {
        return invalid("provider.idleTimeoutSecs", "must be at least 1");
    }
    Ok(())
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `val` and keep it only when it falls inside `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

struct EnvVars<F> {
    lookup: F,
    skipped: Vec<SkippedVar>,
}

impl<F> EnvVars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Empty values count as unset.
    fn text(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn flag(&mut self, name: &'static str) -> Option<bool> {
        let raw = self.text(name)?;
        match parse_bool(&raw) {
            Some(v) => Some(v),
            None => self.skip(name, raw),
        }
    }

    fn number<T>(&mut self, name: &'static str, range: RangeInclusive<T>) -> Option<T>
    where
        T: FromStr + PartialOrd,
    {
        let raw = self.text(name)?;
        match parse_in_range(&raw, range) {
            Some(v) => Some(v),
            None => self.skip(name, raw),
        }
    }

    /// A serde enum spelled by its variant name, e.g. `disabled`.
    fn named<T: DeserializeOwned>(&mut self, name: &'static str) -> Option<T> {
        let raw = self.text(name)?;
        match serde_json::from_value(Value::String(raw.clone())) {
            Ok(v) => Some(v),
            Err(_) => self.skip(name, raw),
        }
    }

    fn skip<T>(&mut self, key: &'static str, value: String) -> Option<T> {
        self.skipped.push(SkippedVar { key, value });
        None
    }
}
