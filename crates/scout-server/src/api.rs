//! HTTP endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use scout_core::SessionId;
use scout_engine::WholeArtifact;
use scout_telemetry::{LogQuery, LogRecord, MetricsSnapshot};

use crate::context::AppContext;
use crate::error::ApiError;

const ACCEPTED: &str = "Message received and is being processed";

pub async fn root() -> Json<Value> {
    Json(json!({"message": "Scout backend is running!"}))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub sessions: usize,
    pub active_turns: usize,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub metrics: MetricsSnapshot,
}

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if ctx.coordinator.is_shutting_down() { "shutting_down" } else { "ok" },
        uptime_secs: ctx.uptime().as_secs(),
        sessions: ctx.coordinator.registry().len(),
        active_turns: ctx.coordinator.active_turns(),
        provider: ctx.provider_name().map(str::to_string),
        model: ctx.provider_model().map(str::to_string),
        metrics: ctx.metrics().snapshot(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub turn_id: String,
}

/// Submit a turn for a connected session. Notifications go out over that
/// session's WebSocket.
pub async fn chat(
    State(ctx): State<AppContext>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = SessionId::from_raw(req.session_id);
    let handle = ctx.coordinator.submit(&session_id, req.message)?;
    info!(session_id = %session_id, turn_id = %handle.turn_id, "chat message accepted over http");
    Ok(Json(ChatResponse {
        success: true,
        message: ACCEPTED.to_string(),
        turn_id: handle.turn_id.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ArtifactRequest {
    pub query: String,
}

pub async fn generate_artifact(
    State(ctx): State<AppContext>,
    Json(req): Json<ArtifactRequest>,
) -> Json<WholeArtifact> {
    let artifact = ctx.catalog.lookup(&req.query);
    info!(query = %req.query, kind = artifact_kind(&artifact), "artifact lookup");
    Json(artifact)
}

fn artifact_kind(artifact: &WholeArtifact) -> &'static str {
    match artifact {
        WholeArtifact::Code { .. } => "code",
        WholeArtifact::Data { .. } => "data",
        WholeArtifact::Message { .. } => "message",
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub level: Option<String>,
    pub target: Option<String>,
    pub session_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogRecord>,
    pub retained: usize,
}

pub async fn logs(State(ctx): State<AppContext>, Query(params): Query<LogsParams>) -> Json<LogsResponse> {
    let query = LogQuery {
        level: params.level,
        target: params.target,
        session_id: params.session_id,
        limit: params.limit.map(|l| l.min(1000)),
    };
    Json(LogsResponse {
        logs: ctx.recent_logs.query(&query),
        retained: ctx.recent_logs.count(),
    })
}
