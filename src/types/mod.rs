// Public modules
pub mod chat_completion;
pub mod chat_input;
pub mod message;
pub mod role;

// Re-exports
pub use chat_completion::{
    ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChunkChoice, ChunkDelta,
    CompletionChoice, CompletionMessage,
};
pub use chat_input::ChatInput;
pub use message::Message;
pub use role::{Role, validate_role};
