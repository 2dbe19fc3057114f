//! Agent turn producer.
//!
//! Given one user message, pushes artifact lifecycle events or chat fragments
//! onto the turn queue. `Done` is pushed when the sink is closed at the end of
//! [`TurnProducer::run`], on every exit path.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scout_core::artifacts::ArtifactType;
use scout_core::messages::ChatMessage;
use scout_core::provider::CompletionProvider;
use scout_core::{ArtifactId, GatewayError, StreamEvent};

use crate::catalog::{ArtifactCatalog, ArtifactRule};
use crate::queue::TurnSink;

/// Error text emitted when no completion provider is configured.
pub const PROVIDER_UNAVAILABLE: &str = "ERROR: Model client not available in agent.";

/// Error text emitted when the provider fails at call time or mid-stream.
pub fn provider_failure_text(reason: &impl Display) -> String {
    format!("ERROR: An error occurred during LLM call: {reason}")
}

#[derive(Clone, Debug)]
pub struct ProducerConfig {
    pub system_prompt: String,
    pub code_chunk_delay: Duration,
    pub data_chunk_delay: Duration,
    /// Bound on `provider.stream()` returning.
    pub request_timeout: Duration,
    /// Bound on each wait for the next fragment.
    pub idle_timeout: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful AI assistant for data discovery.".to_string(),
            code_chunk_delay: Duration::from_millis(50),
            data_chunk_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Why production stopped before its natural end.
enum Halt {
    Cancelled,
    QueueClosed,
}

pub struct TurnProducer {
    catalog: Arc<ArtifactCatalog>,
    provider: Option<Arc<dyn CompletionProvider>>,
    config: ProducerConfig,
}

impl TurnProducer {
    pub fn new(
        catalog: Arc<ArtifactCatalog>,
        provider: Option<Arc<dyn CompletionProvider>>,
        config: ProducerConfig,
    ) -> Self {
        Self {
            catalog,
            provider,
            config,
        }
    }

    /// Produce one turn. Returns the accumulated chat text, empty for
    /// artifact turns. Consumes the sink so `Done` is pushed exactly once.
    pub async fn run(&self, message: &str, sink: TurnSink, cancel: &CancellationToken) -> String {
        let text = if let Some(rule) = self.catalog.select(message) {
            info!(rule = %rule.id, "streaming artifact");
            if let Err(halt) = self.stream_artifact(rule, &sink, cancel).await {
                log_halt(&halt, "artifact");
            }
            String::new()
        } else {
            debug!("no artifact rule matched, using completion provider");
            self.stream_chat(message, &sink, cancel).await
        };
        sink.close();
        text
    }

    async fn stream_artifact(
        &self,
        rule: &ArtifactRule,
        sink: &TurnSink,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let template = &rule.template;
        let artifact_id = ArtifactId::new();
        let delay = match template.artifact_type() {
            ArtifactType::Code => self.config.code_chunk_delay,
            ArtifactType::Data => self.config.data_chunk_delay,
        };

        push(
            sink,
            StreamEvent::ArtifactStart {
                artifact_id: artifact_id.clone(),
                artifact_type: template.artifact_type(),
                metadata: template.metadata(),
            },
        )?;

        let mut halted = None;
        for payload in template.payloads() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    halted = Some(Halt::Cancelled);
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            if let Err(halt) = push(
                sink,
                StreamEvent::ArtifactChunk {
                    artifact_id: artifact_id.clone(),
                    payload,
                },
            ) {
                halted = Some(halt);
                break;
            }
        }

        // An opened artifact is always closed, even when cut short.
        push(sink, StreamEvent::ArtifactEnd { artifact_id })?;
        match halted {
            Some(halt) => Err(halt),
            None => Ok(()),
        }
    }

    async fn stream_chat(&self, message: &str, sink: &TurnSink, cancel: &CancellationToken) -> String {
        let mut accumulated = String::new();

        let Some(provider) = &self.provider else {
            warn!("completion provider not configured");
            let _ = push(sink, error_event(PROVIDER_UNAVAILABLE.to_string()));
            return accumulated;
        };

        let messages = [
            ChatMessage::system(self.config.system_prompt.clone()),
            ChatMessage::user(message),
        ];

        let request_timeout = self.config.request_timeout;
        let started = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log_halt(&Halt::Cancelled, "chat");
                return accumulated;
            }
            r = tokio::time::timeout(request_timeout, provider.stream(&messages)) => r,
        };

        let mut fragments = match started {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                report_provider_failure(sink, &e);
                return accumulated;
            }
            Err(_) => {
                report_provider_failure(sink, &GatewayError::Timeout(request_timeout));
                return accumulated;
            }
        };

        let idle_timeout = self.config.idle_timeout;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log_halt(&Halt::Cancelled, "chat");
                    break;
                }
                n = tokio::time::timeout(idle_timeout, fragments.next()) => n,
            };

            match next {
                Ok(Some(Ok(fragment))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    accumulated.push_str(&fragment);
                    if let Err(halt) = push(sink, StreamEvent::ChatChunk { text: fragment }) {
                        log_halt(&halt, "chat");
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    report_provider_failure(sink, &e);
                    break;
                }
                Ok(None) => {
                    debug!(chars = accumulated.len(), "completion stream finished");
                    break;
                }
                Err(_) => {
                    report_provider_failure(sink, &GatewayError::Timeout(idle_timeout));
                    break;
                }
            }
        }

        accumulated
    }
}

fn push(sink: &TurnSink, event: StreamEvent) -> Result<(), Halt> {
    sink.send(event).map_err(|_| Halt::QueueClosed)
}

fn error_event(message: String) -> StreamEvent {
    StreamEvent::Error { message }
}

fn report_provider_failure(sink: &TurnSink, err: &GatewayError) {
    warn!(error = %err, kind = err.error_kind(), retryable = err.is_retryable(), "completion provider failed");
    let _ = push(sink, error_event(provider_failure_text(err)));
}

fn log_halt(halt: &Halt, phase: &str) {
    match halt {
        Halt::Cancelled => debug!(phase, "turn cancelled"),
        Halt::QueueClosed => debug!(phase, "dispatcher gone, stopping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{turn_queue, TurnStream};
    use scout_llm::{MockProvider, MockResponse};

    fn producer(provider: Option<Arc<dyn CompletionProvider>>) -> TurnProducer {
        TurnProducer::new(
            Arc::new(ArtifactCatalog::builtin()),
            provider,
            ProducerConfig::default(),
        )
    }

    async fn drain(mut stream: TurnStream) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Some(event) = stream.recv().await {
            let done = event.is_terminal();
            out.push(event);
            if done {
                break;
            }
        }
        out
    }

    async fn run_turn(producer: &TurnProducer, message: &str) -> (String, Vec<StreamEvent>) {
        let (sink, stream) = turn_queue();
        let cancel = CancellationToken::new();
        let text = producer.run(message, sink, &cancel).await;
        (text, drain(stream).await)
    }

    #[tokio::test(start_paused = true)]
    async fn python_request_streams_code_artifact() {
        let p = producer(None);
        let (text, events) = run_turn(&p, "generate python user processing script").await;
        assert!(text.is_empty());

        assert_eq!(events.len(), 1 + 12 + 1 + 1);
        let id = match &events[0] {
            StreamEvent::ArtifactStart {
                artifact_id,
                artifact_type,
                metadata,
            } => {
                assert_eq!(*artifact_type, ArtifactType::Code);
                assert_eq!(metadata.title(), "Python User Processing Script");
                artifact_id.clone()
            }
            other => panic!("expected start, got {other:?}"),
        };
        for event in &events[1..13] {
            match event {
                StreamEvent::ArtifactChunk { artifact_id, payload } => {
                    assert_eq!(artifact_id, &id);
                    assert!(payload.as_line().unwrap().ends_with('\n'));
                }
                other => panic!("expected chunk, got {other:?}"),
            }
        }
        assert_eq!(events[13], StreamEvent::ArtifactEnd { artifact_id: id });
        assert_eq!(events[14], StreamEvent::Done);
        assert!(!events.iter().any(|e| matches!(e, StreamEvent::ChatChunk { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_delays_are_applied() {
        let p = producer(None);
        let start = tokio::time::Instant::now();
        let _ = run_turn(&p, "show me the sales data table").await;
        // 3 rows at 100ms
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn provider_fragments_become_chat_chunks() {
        let mock = Arc::new(MockProvider::new(vec![MockResponse::text(&["Hi", "", " there"])]));
        let p = producer(Some(mock.clone() as Arc<dyn CompletionProvider>));
        let (text, events) = run_turn(&p, "hello").await;

        assert_eq!(text, "Hi there");
        assert_eq!(
            events,
            vec![
                StreamEvent::ChatChunk { text: "Hi".into() },
                StreamEvent::ChatChunk { text: " there".into() },
                StreamEvent::Done,
            ]
        );

        let calls = mock.calls();
        assert_eq!(calls[0][0], ChatMessage::system("You are a helpful AI assistant for data discovery."));
        assert_eq!(calls[0][1], ChatMessage::user("hello"));
    }

    #[tokio::test]
    async fn missing_provider_emits_single_error() {
        let p = producer(None);
        let (text, events) = run_turn(&p, "hello").await;
        assert!(text.is_empty());
        assert_eq!(
            events,
            vec![
                StreamEvent::Error { message: PROVIDER_UNAVAILABLE.into() },
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn provider_call_failure() {
        let mock = Arc::new(MockProvider::new(vec![MockResponse::Error(
            GatewayError::AuthenticationFailed("bad key".into()),
        )]));
        let (_, events) = run_turn(&producer(Some(mock as Arc<dyn CompletionProvider>)), "hello").await;
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::Error { message } => {
                assert_eq!(message, "ERROR: An error occurred during LLM call: authentication failed: bad key");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(events[1], StreamEvent::Done);
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_text() {
        let mock = Arc::new(MockProvider::new(vec![MockResponse::FailAfter(
            vec!["Hel".into(), "lo".into()],
            GatewayError::StreamInterrupted("reset".into()),
        )]));
        let (text, events) = run_turn(&producer(Some(mock as Arc<dyn CompletionProvider>)), "hello").await;
        assert_eq!(text, "Hello");
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[2], StreamEvent::Error { message } if message.starts_with("ERROR: ")));
        assert_eq!(events[3], StreamEvent::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_is_a_provider_failure() {
        let mock = Arc::new(MockProvider::new(vec![MockResponse::Stall(vec!["partial".into()])]));
        let p = TurnProducer::new(
            Arc::new(ArtifactCatalog::builtin()),
            Some(mock as Arc<dyn CompletionProvider>),
            ProducerConfig {
                idle_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        );
        let (text, events) = run_turn(&p, "hello").await;
        assert_eq!(text, "partial");
        assert!(matches!(&events[1], StreamEvent::Error { message } if message.contains("timeout")));
        assert_eq!(events[2], StreamEvent::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_is_a_provider_failure() {
        let mock = Arc::new(MockProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(120),
            MockResponse::text(&["late"]),
        )]));
        let p = TurnProducer::new(
            Arc::new(ArtifactCatalog::builtin()),
            Some(mock as Arc<dyn CompletionProvider>),
            ProducerConfig {
                request_timeout: Duration::from_secs(1),
                ..Default::default()
            },
        );
        let (text, events) = run_turn(&p, "hello").await;
        assert!(text.is_empty());
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StreamEvent::Error { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_closes_open_artifact() {
        let p = producer(None);
        let (sink, stream) = turn_queue();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            trigger.cancel();
        });

        p.run("generate python user processing script", sink, &cancel).await;
        let events = drain(stream).await;

        let chunks = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ArtifactChunk { .. }))
            .count();
        assert!(chunks < 12, "expected an early stop, got {chunks} chunks");
        assert!(matches!(events[events.len() - 2], StreamEvent::ArtifactEnd { .. }));
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_stalled_provider() {
        let mock = Arc::new(MockProvider::new(vec![MockResponse::Stall(vec!["a".into()])]));
        let p = producer(Some(mock as Arc<dyn CompletionProvider>));
        let (sink, stream) = turn_queue();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let text = p.run("hello", sink, &cancel).await;
        assert_eq!(text, "a");
        let events = drain(stream).await;
        assert_eq!(events, vec![StreamEvent::ChatChunk { text: "a".into() }, StreamEvent::Done]);
    }

    #[tokio::test(start_paused = true)]
    async fn consumer_gone_stops_production() {
        let p = producer(None);
        let (sink, stream) = turn_queue();
        drop(stream);
        let start = tokio::time::Instant::now();
        p.run("show me the sales data table", sink, &CancellationToken::new()).await;
        // stopped at the first failed push instead of sleeping through every row
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
