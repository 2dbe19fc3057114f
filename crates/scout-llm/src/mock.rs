use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;

use scout_core::messages::ChatMessage;
use scout_core::provider::{CompletionProvider, FragmentStream};
use scout_core::GatewayError;

/// Pre-programmed responses for deterministic testing without API calls.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield these fragments, then end.
    Fragments(Vec<String>),
    /// Fail the `stream()` call itself.
    Error(GatewayError),
    /// Yield these fragments, then a terminal error item.
    FailAfter(Vec<String>, GatewayError),
    /// Yield these fragments, then never produce another item.
    Stall(Vec<String>),
    /// Sleep between fragments.
    Paced(Vec<String>, Duration),
    /// Wait before answering the call, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(fragments: &[&str]) -> Self {
        Self::Fragments(fragments.iter().map(|s| s.to_string()).collect())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
///
/// With [`MockProvider::repeating`] the last response is reused for every
/// call past the end of the script.
pub struct MockProvider {
    responses: Vec<MockResponse>,
    repeat_last: bool,
    call_count: AtomicUsize,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses,
            repeat_last: false,
            call_count: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn repeating(response: MockResponse) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![response])
        }
    }

    /// Messages received by each call, in call order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.calls.lock().push(messages.to_vec());

        let response = match self.responses.get(idx) {
            Some(r) => r.clone(),
            None if self.repeat_last && !self.responses.is_empty() => {
                self.responses[self.responses.len() - 1].clone()
            }
            None => {
                return Err(GatewayError::InvalidRequest(format!(
                    "MockProvider: no response configured for call {idx}"
                )))
            }
        };

        resolve_response(response).await
    }
}

/// Resolve a MockResponse, unrolling nested delays iteratively.
async fn resolve_response(mut current: MockResponse) -> Result<FragmentStream, GatewayError> {
    loop {
        match current {
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::Fragments(fragments) => {
                return Ok(Box::pin(stream::iter(fragments.into_iter().map(Ok::<String, GatewayError>))));
            }
            MockResponse::FailAfter(fragments, err) => {
                let items = fragments
                    .into_iter()
                    .map(Ok::<String, GatewayError>)
                    .chain(std::iter::once(Err(err)));
                return Ok(Box::pin(stream::iter(items)));
            }
            MockResponse::Stall(fragments) => {
                let head = stream::iter(fragments.into_iter().map(Ok::<String, GatewayError>));
                return Ok(Box::pin(head.chain(stream::pending())));
            }
            MockResponse::Paced(fragments, gap) => {
                let paced = stream::iter(fragments).then(move |f| async move {
                    tokio::time::sleep(gap).await;
                    Ok::<String, GatewayError>(f)
                });
                return Ok(Box::pin(paced));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(stream: FragmentStream) -> Vec<Result<String, GatewayError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn sequential_responses() {
        let provider = MockProvider::new(vec![
            MockResponse::text(&["a", "b"]),
            MockResponse::Error(GatewayError::InvalidRequest("unknown model".into())),
        ]);

        let first = collect(provider.stream(&[ChatMessage::user("1")]).await.unwrap()).await;
        assert_eq!(first.len(), 2);
        assert!(provider.stream(&[ChatMessage::user("2")]).await.is_err());
        // script exhausted
        assert!(provider.stream(&[ChatMessage::user("3")]).await.is_err());
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn repeating_reuses_last() {
        let provider = MockProvider::repeating(MockResponse::text(&["ok"]));
        for _ in 0..3 {
            let out = collect(provider.stream(&[]).await.unwrap()).await;
            assert_eq!(out[0].as_deref().unwrap(), "ok");
        }
    }

    #[tokio::test]
    async fn fail_after_ends_with_error() {
        let provider = MockProvider::new(vec![MockResponse::FailAfter(
            vec!["Hi".into()],
            GatewayError::StreamInterrupted("reset".into()),
        )]);
        let out = collect(provider.stream(&[]).await.unwrap()).await;
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }

    #[tokio::test]
    async fn records_messages() {
        let provider = MockProvider::repeating(MockResponse::text(&[]));
        let _ = provider
            .stream(&[ChatMessage::system("s"), ChatMessage::user("u")])
            .await
            .unwrap();
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1].content, "u");
    }

    #[tokio::test(start_paused = true)]
    async fn delay_waits_before_resolving() {
        let provider = MockProvider::new(vec![MockResponse::delayed(
            Duration::from_secs(5),
            MockResponse::text(&["late"]),
        )]);
        let start = tokio::time::Instant::now();
        let out = collect(provider.stream(&[]).await.unwrap()).await;
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(out.len(), 1);
    }
}
