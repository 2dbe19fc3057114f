//! Application context shared by every handler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use scout_core::provider::CompletionProvider;
use scout_engine::{ArtifactCatalog, ProducerConfig, TurnCoordinator, TurnProducer};
use scout_llm::{OpenAiCompatConfig, OpenAiCompatProvider};
use scout_settings::{ProviderSettings, ScoutSettings, ServerSettings};
use scout_telemetry::{MetricsRecorder, RecentLogs};

/// Owned by `main` and cloned into axum state. Cloning is cheap.
#[derive(Clone)]
pub struct AppContext {
    pub coordinator: Arc<TurnCoordinator>,
    pub catalog: Arc<ArtifactCatalog>,
    pub recent_logs: Arc<RecentLogs>,
    pub server: Arc<ServerSettings>,
    provider: Option<ProviderInfo>,
    started_at: Instant,
    shutdown: CancellationToken,
}

#[derive(Clone, Debug)]
struct ProviderInfo {
    name: String,
    model: String,
}

impl AppContext {
    pub fn new(
        settings: &ScoutSettings,
        catalog: ArtifactCatalog,
        provider: Option<Arc<dyn CompletionProvider>>,
        metrics: Arc<MetricsRecorder>,
        recent_logs: Arc<RecentLogs>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let info = provider.as_ref().map(|p| ProviderInfo {
            name: p.name().to_string(),
            model: p.model().to_string(),
        });
        let producer = TurnProducer::new(Arc::clone(&catalog), provider, producer_config(settings));
        let coordinator = TurnCoordinator::new(
            Arc::new(producer),
            metrics,
            settings.server.max_send_queue,
        );

        Self {
            coordinator: Arc::new(coordinator),
            catalog,
            recent_logs,
            server: Arc::new(settings.server.clone()),
            provider: info,
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        self.coordinator.metrics()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.name.as_str())
    }

    pub fn provider_model(&self) -> Option<&str> {
        self.provider.as_ref().map(|p| p.model.as_str())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Cancelled once [`AppContext::shutdown`] starts. Connection loops watch it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Close client connections, cancel every session and wait for
    /// in-flight turns.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.coordinator.shutdown().await;
        info!("application context shut down");
    }
}

fn producer_config(settings: &ScoutSettings) -> ProducerConfig {
    ProducerConfig {
        system_prompt: settings.provider.system_prompt.clone(),
        code_chunk_delay: Duration::from_millis(settings.artifacts.code_chunk_delay_ms),
        data_chunk_delay: Duration::from_millis(settings.artifacts.data_chunk_delay_ms),
        request_timeout: Duration::from_secs(settings.provider.request_timeout_secs),
        idle_timeout: Duration::from_secs(settings.provider.idle_timeout_secs),
    }
}

/// Build the configured completion provider, or `None` when chat turns
/// should answer with the "not available" error.
pub fn build_provider(settings: &ProviderSettings) -> Option<Arc<dyn CompletionProvider>> {
    if !settings.is_configured() {
        warn!(kind = ?settings.kind, "completion provider not configured, chat turns will report an error");
        return None;
    }
    let api_key = settings.api_key.clone().unwrap_or_default();
    let provider: Arc<dyn CompletionProvider> = Arc::new(OpenAiCompatProvider::new(OpenAiCompatConfig {
        base_url: settings.base_url.clone(),
        model: settings.model.clone(),
        api_key,
        request_timeout: Duration::from_secs(settings.request_timeout_secs),
    }));
    info!(base_url = %settings.base_url, model = %settings.model, "completion provider ready");
    Some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_llm::MockProvider;
    use scout_settings::ProviderKind;

    #[test]
    fn provider_requires_api_key() {
        let mut settings = ProviderSettings::default();
        assert!(build_provider(&settings).is_none());

        settings.api_key = Some("sk-test".into());
        let provider = build_provider(&settings).unwrap();
        assert_eq!(provider.name(), "openai_compat");
        assert_eq!(provider.model(), "gpt-4o-mini");

        settings.kind = ProviderKind::Disabled;
        assert!(build_provider(&settings).is_none());
    }

    #[test]
    fn producer_config_follows_settings() {
        let mut settings = ScoutSettings::default();
        settings.artifacts.code_chunk_delay_ms = 5;
        settings.provider.idle_timeout_secs = 7;
        let config = producer_config(&settings);
        assert_eq!(config.code_chunk_delay, Duration::from_millis(5));
        assert_eq!(config.data_chunk_delay, Duration::from_millis(100));
        assert_eq!(config.idle_timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn context_reports_provider_and_shuts_down() {
        let ctx = AppContext::new(
            &ScoutSettings::default(),
            ArtifactCatalog::builtin(),
            Some(Arc::new(MockProvider::new(vec![])) as Arc<dyn CompletionProvider>),
            Arc::new(MetricsRecorder::new()),
            Arc::new(RecentLogs::new(8)),
        );
        assert_eq!(ctx.provider_name(), Some("mock"));
        assert_eq!(ctx.provider_model(), Some("mock-model"));

        let token = ctx.shutdown_token();
        ctx.shutdown().await;
        assert!(token.is_cancelled());
        assert!(ctx.coordinator.is_shutting_down());
    }
}
