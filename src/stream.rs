//! Drives one streaming chat-completion exchange.
//!
//! [`stream_completion`] pulls text fragments from a [`ChatService`], hands
//! every non-empty fragment to a [`DeltaSink`] in arrival order, and returns
//! the accumulated [`StreamState`].  The exchange is bounded by a deadline.

use std::time::{Duration, Instant};

use futures::StreamExt;

use crate::error::{Error, Result};
use crate::interrupt::InterruptSignal;
use crate::observability::{
    STREAM_BYTES, STREAM_DELTAS, STREAM_DURATION, STREAM_ERRORS, STREAM_EXCHANGES,
};
use crate::service::ChatService;
use crate::types::ChatInput;

/// Deadline applied when the input does not carry a positive timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Consumer of streamed text fragments.
///
/// A failing sink stops the exchange; its error is returned unchanged.
pub trait DeltaSink {
    /// Receive the next non-empty fragment.
    fn on_delta(&mut self, delta: &str) -> Result<()>;
}

impl<F> DeltaSink for F
where
    F: FnMut(&str) -> Result<()>,
{
    fn on_delta(&mut self, delta: &str) -> Result<()> {
        self(delta)
    }
}

/// What one exchange produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamState {
    /// Every forwarded fragment, concatenated.
    pub buffer: String,
    /// The most recent non-empty fragment.
    pub last_delta: Option<String>,
}

impl StreamState {
    fn record(&mut self, delta: String) {
        self.buffer.push_str(&delta);
        self.last_delta = Some(delta);
    }

    /// Returns true if the output did not end with a newline.
    ///
    /// Callers emit one newline in that case so the next prompt starts on a
    /// fresh line.  An exchange that produced nothing also needs one.
    pub fn needs_trailing_newline(&self) -> bool {
        self.last_delta
            .as_deref()
            .is_none_or(|delta| !delta.ends_with('\n'))
    }
}

/// Resolves the deadline for an exchange; zero means the default.
pub fn effective_timeout(timeout: Option<Duration>) -> Duration {
    match timeout {
        Some(timeout) if !timeout.is_zero() => timeout,
        _ => DEFAULT_TIMEOUT,
    }
}

/// Run one exchange to completion, forwarding deltas to `sink`.
///
/// # Errors
///
/// Returns [`Error::Timeout`] when the deadline elapses, the service's error
/// when the request or the stream fails, and the sink's error when the sink
/// fails.  Nothing is retried.
pub async fn stream_completion<S>(
    service: &dyn ChatService,
    input: &ChatInput,
    sink: &mut S,
) -> Result<StreamState>
where
    S: DeltaSink + ?Sized,
{
    stream_completion_until(service, input, sink, None).await
}

/// Like [`stream_completion`], but also stops with [`Error::Abort`] when
/// `interrupt` fires.
///
/// Arm the signal before calling this if earlier interrupts must not count.
pub async fn stream_completion_until<S>(
    service: &dyn ChatService,
    input: &ChatInput,
    sink: &mut S,
    interrupt: Option<&mut InterruptSignal>,
) -> Result<StreamState>
where
    S: DeltaSink + ?Sized,
{
    let timeout = effective_timeout(input.timeout);
    let start = Instant::now();
    STREAM_EXCHANGES.click();
    tracing::debug!(
        model = %input.model,
        messages = input.messages.len(),
        timeout_secs = timeout.as_secs_f64(),
        "starting chat exchange"
    );

    let exchange = tokio::time::timeout(timeout, drain(service, input, sink));
    let outcome = match interrupt {
        Some(interrupt) => {
            tokio::select! {
                outcome = exchange => outcome,
                () = interrupt.interrupted() => Ok(Err(Error::abort("interrupted by user"))),
            }
        }
        None => exchange.await,
    };
    let result = outcome.unwrap_or_else(|_| {
        Err(Error::timeout(
            "chat completion did not finish before the deadline",
            Some(timeout.as_secs_f64()),
        ))
    });

    STREAM_DURATION.add(start.elapsed().as_secs_f64());
    match &result {
        Ok(state) => {
            tracing::debug!(bytes = state.buffer.len(), "chat exchange finished");
        }
        Err(err) => {
            if !err.is_sink() {
                STREAM_ERRORS.click();
            }
            tracing::debug!(error = %err, "chat exchange failed");
        }
    }
    result
}

async fn drain<S>(service: &dyn ChatService, input: &ChatInput, sink: &mut S) -> Result<StreamState>
where
    S: DeltaSink + ?Sized,
{
    let mut deltas = service.chat_stream(input).await?;
    let mut state = StreamState::default();
    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        if delta.is_empty() {
            continue;
        }
        sink.on_delta(&delta)?;
        STREAM_DELTAS.click();
        STREAM_BYTES.count(delta.len() as u64);
        state.record(delta);
    }
    Ok(state)
}
