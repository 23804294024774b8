use serde::{Deserialize, Serialize};

use crate::types::{ChatInput, Message};

/// Request body for the chat-completions endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    /// Model identifier.
    pub model: &'a str,

    /// Conversation messages.
    pub messages: &'a [Message],

    /// Upper bound on generated tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Whether the service should reply with server-sent events.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl<'a> ChatCompletionRequest<'a> {
    /// Builds the request body for `input`.
    pub fn from_input(input: &'a ChatInput, stream: bool) -> Self {
        Self {
            model: &input.model,
            messages: &input.messages,
            max_tokens: input.effective_max_tokens(),
            temperature: input.temperature,
            stream,
        }
    }
}

/// The incremental message content carried by a stream chunk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    /// Text appended by this chunk, if any.
    #[serde(default)]
    pub content: Option<String>,
}

/// One choice of a stream chunk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChunkChoice {
    /// Index of the choice.
    #[serde(default)]
    pub index: u32,

    /// The delta for this choice.
    #[serde(default)]
    pub delta: ChunkDelta,

    /// Why generation stopped, on the last chunk.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A single server-sent chunk of a streaming chat completion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    /// Choices carried by the chunk; usually exactly one.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Returns the first choice's text when it is non-empty.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|text| !text.is_empty())
    }
}

/// A complete message returned by a non-streaming request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletionMessage {
    /// The generated text.
    #[serde(default)]
    pub content: Option<String>,
}

/// One choice of a non-streaming completion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletionChoice {
    /// The generated message.
    pub message: CompletionMessage,
}

/// A non-streaming chat completion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatCompletion {
    /// Generated choices.
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

impl ChatCompletion {
    /// Returns the first choice's text.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}
