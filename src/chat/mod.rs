//! The two chat commands built on the transcript and stream layers.
//!
//! - `chatfile` replies once to a transcript file and can append the reply
//!   to it ([`chat_file`]).
//! - `chatfile-ask` answers a question from the command line and keeps the
//!   conversation going interactively ([`ask`], [`InteractiveSession`]).
//!
//! # Architecture
//!
//! - [`config`]: CLI argument parsing, configuration, and the config store
//! - [`input`]: blocking line sources for follow-up questions
//! - [`session`]: the respond/await-input state machine

mod ask;
mod config;
mod file;
mod input;
mod session;

pub use ask::{BASH_SYSTEM_PROMPT, ask, ask_messages, build_content};
pub use config::{
    AskArgs, AskConfig, ChatFileArgs, ChatFileConfig, ConfigStore, DEFAULT_MODEL, EnvConfigStore,
    RequestOptions,
};
pub use file::{
    STDIO_PATH, chat_file, read_transcript_source, reply_to_transcript, resolve_write_target,
};
pub use input::{LineSource, StdinLines};
pub use session::{DEFAULT_PROMPT, InteractiveSession, SessionEnd, Step};
