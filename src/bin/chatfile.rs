//! Reply to a plain-text transcript.
//!
//! # Usage
//!
//! ```bash
//! # Stream a reply to the conversation in chat.txt
//! chatfile chat.txt
//!
//! # Append the reply to chat.txt itself
//! chatfile chat.txt -
//!
//! # Read the transcript from stdin and write the extended one elsewhere
//! cat chat.txt | chatfile --model gpt-4o - reply.txt
//! ```
//!
//! A transcript looks like:
//!
//! ```text
//! --- system
//! You are terse.
//! --- user
//! What is a monad?
//! ```

use arrrg::CommandLine;

use chatfile::chat::{ChatFileArgs, ChatFileConfig, EnvConfigStore, chat_file};
use chatfile::{Result, emit_biometrics_from_env, init_tracing};

const USAGE: &str = "chatfile [OPTIONS] <FILE> [WRITE]";

async fn run() -> Result<()> {
    let (args, positional) = ChatFileArgs::from_command_line_relaxed(USAGE);
    let config = ChatFileConfig::from_args(args, positional)?;
    let store = EnvConfigStore::from_env().with_streaming(config.request.stream);
    chat_file(&config, &store).await
}

/// Main entry point for the chatfile application.
#[tokio::main]
async fn main() {
    init_tracing();
    let result = run().await;
    emit_biometrics_from_env();
    if let Err(err) = result {
        if !err.is_silent_termination() {
            eprintln!("Error: {err}");
        }
        std::process::exit(err.exit_code());
    }
}
