// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod interrupt;
pub mod observability;
pub mod render;
pub mod service;
pub mod sse;
pub mod stream;
pub mod transcript;
pub mod types;

// Re-exports
pub use client::OpenAi;
pub use error::{Error, Result};
pub use interrupt::InterruptSignal;
pub use observability::{emit_biometrics_from_env, init_tracing, register_biometrics};
pub use render::{PlainTextRenderer, Renderer};
pub use service::{ChatService, DeltaStream};
pub use stream::{
    DEFAULT_TIMEOUT, DeltaSink, StreamState, stream_completion, stream_completion_until,
};
pub use transcript::{
    append_assistant, append_message, append_reply_checked, parse_transcript, parse_transcript_str,
    serialize_append, write_transcript_file,
};
pub use types::*;
