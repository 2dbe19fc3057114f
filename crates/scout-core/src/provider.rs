use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::GatewayError;
use crate::messages::ChatMessage;

/// Lazy, finite sequence of text fragments. An `Err` item ends the stream.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// A streaming text-completion backend.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    async fn stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream, GatewayError>;
}
