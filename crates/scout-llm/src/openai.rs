use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use scout_core::messages::ChatMessage;
use scout_core::provider::{CompletionProvider, FragmentStream};
use scout_core::GatewayError;

use crate::sse::parse_sse_lines;

/// Connection settings for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiCompatConfig {
    /// Base URL without the trailing `/chat/completions`.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// Bound on connecting and receiving response headers.
    pub request_timeout: Duration,
}

/// Streaming client for `POST {base_url}/chat/completions`.
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config: OpenAiCompatConfig { base_url, ..config },
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn build_headers(&self) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| GatewayError::InvalidRequest(format!("invalid authorization header: {e}")))?;
        let _ = headers.insert(AUTHORIZATION, bearer);
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        Ok(headers)
    }
}

/// Extract a readable message from an error response body.
fn parse_api_error(body: &str, status: u16) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::NetworkError(e.to_string())
    }
}

/// Turn one SSE `data:` payload into an optional text fragment.
fn fragment_from_data(data: &str) -> Option<Result<String, GatewayError>> {
    let chunk: ChatCompletionChunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to parse completion chunk, skipping");
            return None;
        }
    };
    if let Some(err) = chunk.error {
        return Some(Err(GatewayError::StreamInterrupted(err.message)));
    }
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty())
        .map(Ok)
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai_compat"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream, GatewayError> {
        debug!(
            model = %self.config.model,
            message_count = messages.len(),
            "starting completion stream"
        );

        let headers = self.build_headers()?;
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            stream: true,
        };

        let timeout = self.config.request_timeout;
        let send = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&request)
            .send();

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| GatewayError::Timeout(timeout))?
            .map_err(|e| map_send_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(&body, status.as_u16());
            return Err(GatewayError::from_status(status.as_u16(), message));
        }

        let fragments = parse_sse_lines(Box::pin(response.bytes_stream())).filter_map(|item| {
            std::future::ready(match item {
                Ok(data) => fragment_from_data(&data),
                Err(e) => Some(Err(e)),
            })
        });

        Ok(Box::pin(fragments))
    }
}
