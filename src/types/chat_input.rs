use std::time::Duration;

use crate::types::Message;

/// Everything needed to request one chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatInput {
    /// The conversation so far, in order.
    pub messages: Vec<Message>,

    /// Upper bound on generated tokens; `None` or zero uses the service default.
    pub max_tokens: Option<u32>,

    /// Sampling temperature; `None` uses the service default.
    pub temperature: Option<f32>,

    /// Model identifier.
    pub model: String,

    /// Deadline for the whole exchange; `None` or zero uses the default.
    pub timeout: Option<Duration>,
}

impl ChatInput {
    /// Create a new `ChatInput` for `model` with service defaults.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
            model: model.into(),
            timeout: None,
        }
    }

    /// Sets the token bound.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the request deadline.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the token bound to send, dropping zero.
    pub fn effective_max_tokens(&self) -> Option<u32> {
        self.max_tokens.filter(|&n| n > 0)
    }
}
