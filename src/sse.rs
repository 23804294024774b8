//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module converts the raw byte stream of a streaming chat-completions
//! response into parsed [`ChatCompletionChunk`]s.  Events are delimited by a
//! blank line; only `data:` fields are meaningful and `data: [DONE]` ends the
//! stream.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::{Error, Result};
use crate::types::ChatCompletionChunk;

const DONE_MARKER: &str = "[DONE]";

/// One decoded SSE event.
#[derive(Debug)]
enum SseEvent {
    /// A data payload carrying a completion chunk.
    Chunk(Result<ChatCompletionChunk>),
    /// The end-of-stream marker.
    Done,
    /// An event with no data (comments, keep-alives).
    Empty,
}

/// Process a stream of bytes into a stream of completion chunks.
///
/// Bytes are buffered until a complete event is available, so multi-byte
/// characters and events may be split across network reads.  Carriage returns
/// are discarded, which makes `\r\n` framing equivalent to `\n` framing.
pub fn process_sse<S, E>(byte_stream: S) -> impl Stream<Item = Result<ChatCompletionChunk>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    // Convert transport errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    let buffer: Vec<u8> = Vec::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                // First check if we have a complete event in the buffer
                if let Some(event_text) = take_event(&mut buffer) {
                    match decode_event(&event_text) {
                        SseEvent::Chunk(chunk) => return Some((chunk, (stream, buffer, false))),
                        SseEvent::Done => return None,
                        SseEvent::Empty => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.iter().copied().filter(|&b| b != b'\r'));
                    }
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // End of stream; a final event may lack its blank line
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let event_text = std::mem::take(&mut buffer);
                        return match decode_event(&event_text) {
                            SseEvent::Chunk(chunk) => Some((chunk, (stream, buffer, true))),
                            SseEvent::Done | SseEvent::Empty => None,
                        };
                    }
                }
            }
        },
    )
}

/// Remove and return the bytes of the first complete event in `buffer`.
fn take_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.windows(2).position(|pair| pair == b"\n\n")?;
    let mut event: Vec<u8> = buffer.drain(..end + 2).collect();
    event.truncate(end);
    Some(event)
}

/// Decode the fields of one event.
fn decode_event(event: &[u8]) -> SseEvent {
    let text = match std::str::from_utf8(event) {
        Ok(text) => text,
        Err(e) => {
            return SseEvent::Chunk(Err(Error::encoding(
                format!("Invalid UTF-8 in stream: {e}"),
                Some(Box::new(e)),
            )));
        }
    };

    let mut data: Option<String> = None;
    for line in text.lines() {
        // Lines starting with ':' are comments; `event:`, `id:`, and `retry:`
        // carry nothing for chat completions.
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        match data.as_mut() {
            Some(data) => {
                data.push('\n');
                data.push_str(value);
            }
            None => data = Some(value.to_string()),
        }
    }

    match data.as_deref().map(str::trim) {
        None | Some("") => SseEvent::Empty,
        Some(DONE_MARKER) => SseEvent::Done,
        Some(json) => SseEvent::Chunk(serde_json::from_str(json).map_err(|e| {
            Error::serialization(
                format!("Failed to parse event JSON: {e}"),
                Some(Box::new(e)),
            )
        })),
    }
}
