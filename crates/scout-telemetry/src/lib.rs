mod logging;
mod metrics;

pub use logging::{LogQuery, LogRecord, RecentLogs, RecentLogsLayer};
pub use metrics::{HistogramSummary, MetricsRecorder, MetricsSnapshot};

use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "scout_llm" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// How many warn+ records to keep in memory.
    pub recent_log_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
            recent_log_capacity: 256,
        }
    }
}

/// Handles to the process-wide telemetry state.
pub struct TelemetryGuard {
    metrics: Arc<MetricsRecorder>,
    recent_logs: Arc<RecentLogs>,
}

impl TelemetryGuard {
    pub fn metrics(&self) -> Arc<MetricsRecorder> {
        self.metrics.clone()
    }

    pub fn recent_logs(&self) -> Arc<RecentLogs> {
        self.recent_logs.clone()
    }
}

/// Parse a level name such as `"debug"` or `"WARN"`.
pub fn parse_level(s: &str) -> Option<Level> {
    s.trim().parse::<Level>().ok()
}

/// Build the filter directive string, e.g. `info,scout_llm=debug`.
fn filter_directives(config: &TelemetryConfig) -> String {
    let mut filter_str = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter_str.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter_str
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let filter_str = filter_directives(&config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    let recent_logs = Arc::new(RecentLogs::new(config.recent_log_capacity));

    if let Err(e) = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(RecentLogsLayer::new(recent_logs.clone()))
        .try_init()
    {
        eprintln!("scout-telemetry: subscriber already installed: {e}");
    }

    TelemetryGuard {
        metrics: Arc::new(MetricsRecorder::new()),
        recent_logs,
    }
}
