//! The seam between the session logic and a chat-completions backend.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::error::Result;
use crate::types::ChatInput;

/// A lazily-consumed sequence of text fragments in emission order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A service that can stream a chat completion for a message sequence.
///
/// Implementations open the request when `chat_stream` is called and yield
/// text fragments as the service emits them.  Dropping the stream abandons
/// the request.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    /// Start a completion for `input` and return its text fragments.
    async fn chat_stream(&self, input: &ChatInput) -> Result<DeltaStream>;
}

#[async_trait::async_trait]
impl<S: ChatService + ?Sized> ChatService for Arc<S> {
    async fn chat_stream(&self, input: &ChatInput) -> Result<DeltaStream> {
        (**self).chat_stream(input).await
    }
}
