//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial JSON
//! files are accepted and missing fields keep their compiled default.

use serde::{Deserialize, Serialize};

/// Default system prompt sent ahead of every user message.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant for data discovery.";

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoutSettings {
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    pub artifacts: ArtifactSettings,
    pub logging: LoggingSettings,
}

/// HTTP / WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    /// Capacity of each session's outbound notification channel.
    pub max_send_queue: usize,
    /// WebSocket ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// A client that sends nothing (not even a pong) for this long is dropped.
    pub client_timeout_secs: u64,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_send_queue: 256,
            heartbeat_interval_secs: 30,
            client_timeout_secs: 90,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://localhost:8080".to_string(),
                "http://127.0.0.1:8080".to_string(),
            ],
        }
    }
}

/// Which completion backend to build at startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Any server speaking the OpenAI chat-completions streaming protocol.
    #[default]
    OpenaiCompat,
    /// No provider. Chat turns answer with the "not available" error.
    Disabled,
}

/// Completion provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    /// Base URL, without the trailing `/chat/completions`.
    pub base_url: String,
    pub model: String,
    /// Bearer token. The provider is treated as unconfigured when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub system_prompt: String,
    /// Bound on the initial request, up to response headers.
    pub request_timeout_secs: u64,
    /// Bound on the wait for each subsequent fragment.
    pub idle_timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenaiCompat,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout_secs: 30,
            idle_timeout_secs: 60,
        }
    }
}

impl ProviderSettings {
    /// Whether a provider should be constructed at all.
    pub fn is_configured(&self) -> bool {
        self.kind == ProviderKind::OpenaiCompat
            && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Artifact catalog settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactSettings {
    /// JSON catalog replacing the built-in rules.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_path: Option<String>,
    pub code_chunk_delay_ms: u64,
    pub data_chunk_delay_ms: u64,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            rules_path: None,
            code_chunk_delay_ms: 50,
            data_chunk_delay_ms: 100,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level name (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Per-module overrides, e.g. `{"scout_llm": "debug"}`.
    pub modules: std::collections::BTreeMap<String, String>,
    /// Emit JSON lines.
    pub json: bool,
    /// Number of warn+ records retained for `/api/logs`.
    pub recent_capacity: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: std::collections::BTreeMap::new(),
            json: false,
            recent_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = ScoutSettings::default();
        assert_eq!(s.server.port, 8000);
        assert_eq!(s.server.cors_origins.len(), 4);
        assert_eq!(s.provider.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(s.artifacts.code_chunk_delay_ms, 50);
        assert_eq!(s.artifacts.data_chunk_delay_ms, 100);
        assert!(!s.provider.is_configured());
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(ScoutSettings::default()).unwrap();
        assert_eq!(json["server"]["maxSendQueue"], 256);
        assert_eq!(json["provider"]["kind"], "openai_compat");
        assert!(json["provider"].get("apiKey").is_none());
    }

    #[test]
    fn configured_requires_key_and_kind() {
        let mut p = ProviderSettings {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert!(p.is_configured());
        p.kind = ProviderKind::Disabled;
        assert!(!p.is_configured());
        p.kind = ProviderKind::OpenaiCompat;
        p.api_key = Some(String::new());
        assert!(!p.is_configured());
    }
}
