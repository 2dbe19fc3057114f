//! # scout
//!
//! Scout chat backend binary: loads settings, starts telemetry and the
//! HTTP/WebSocket server, and shuts down on Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use scout_engine::ArtifactCatalog;
use scout_server::{build_provider, AppContext, ServerConfig};
use scout_settings::{load_settings_from_path, settings_path, LoadedSettings, ScoutSettings};
use scout_telemetry::{init_telemetry, parse_level, TelemetryConfig};

/// Scout data discovery chat backend.
#[derive(Parser, Debug)]
#[command(name = "scout", about = "Scout data discovery chat backend")]
struct Cli {
    /// Settings file (defaults to `~/.scout/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Default log level (overrides settings; RUST_LOG still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, settings: &mut ScoutSettings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn telemetry_config(settings: &ScoutSettings) -> TelemetryConfig {
    let logging = &settings.logging;
    let mut config = TelemetryConfig {
        json: logging.json,
        recent_log_capacity: logging.recent_capacity,
        ..Default::default()
    };
    if let Some(level) = parse_level(&logging.level) {
        config.log_level = level;
    }
    config.module_levels = logging
        .modules
        .iter()
        .filter_map(|(module, level)| parse_level(level).map(|l| (module.clone(), l)))
        .collect();
    config
}

fn load_catalog(path: Option<&str>) -> Result<ArtifactCatalog> {
    match path {
        Some(path) => ArtifactCatalog::load(Path::new(path))
            .with_context(|| format!("failed to load artifact rules from {path}")),
        None => Ok(ArtifactCatalog::builtin()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(settings_path);
    let LoadedSettings { mut settings, skipped } = load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    let telemetry = init_telemetry(telemetry_config(&settings));
    tracing::info!(settings = %path.display(), "starting scout");
    for var in &skipped {
        tracing::warn!(key = var.key, value = %var.value, "invalid env var, ignoring");
    }

    let catalog = load_catalog(settings.artifacts.rules_path.as_deref())?;
    tracing::info!(rules = catalog.rules.len(), lookups = catalog.lookups.len(), "artifact catalog loaded");

    let provider = build_provider(&settings.provider);
    let ctx = AppContext::new(
        &settings,
        catalog,
        provider,
        telemetry.metrics(),
        telemetry.recent_logs(),
    );

    let handle = scout_server::start(ServerConfig::from(&settings.server), ctx)
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port(), "scout ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_settings() {
        let cli = Cli::parse_from(["scout", "--port", "9000", "--log-level", "debug", "--json-logs"]);
        let mut settings = ScoutSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn telemetry_config_skips_bad_levels() {
        let mut settings = ScoutSettings::default();
        settings.logging.level = "warn".into();
        settings.logging.modules.insert("scout_llm".into(), "debug".into());
        settings.logging.modules.insert("scout_server".into(), "chatty".into());
        let config = telemetry_config(&settings);
        assert_eq!(config.log_level, tracing::Level::WARN);
        assert_eq!(config.module_levels, vec![("scout_llm".to_string(), tracing::Level::DEBUG)]);
    }

    #[test]
    fn missing_rules_file_is_an_error() {
        assert!(load_catalog(Some("/nonexistent/rules.json")).is_err());
        assert!(!load_catalog(None).unwrap().rules.is_empty());
    }
}
