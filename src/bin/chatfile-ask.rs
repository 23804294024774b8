//! Ask a question and keep the conversation going.
//!
//! # Usage
//!
//! ```bash
//! # Ask, then type follow-ups at the prompt (blank line or Ctrl+C to stop)
//! chatfile-ask how do I find large files
//!
//! # Get commented bash back and exit after the first answer
//! chatfile-ask --bash --once -- list files modified today
//!
//! # Attach files; '-' attaches stdin
//! git diff | chatfile-ask --attach - summarize this change
//! ```

use arrrg::CommandLine;

use chatfile::chat::{AskArgs, AskConfig, EnvConfigStore, SessionEnd, ask};
use chatfile::{InterruptSignal, Result, emit_biometrics_from_env, init_tracing};

const USAGE: &str = "chatfile-ask [OPTIONS] [QUESTION]...";

async fn run() -> Result<SessionEnd> {
    let (args, question) = AskArgs::from_command_line_relaxed(USAGE);
    let config = AskConfig::from_args(args, question)?;
    let store = EnvConfigStore::from_env().with_streaming(config.request.stream);
    ask(&config, &store, InterruptSignal::install).await
}

/// Main entry point for the chatfile-ask application.
#[tokio::main]
async fn main() {
    init_tracing();
    let code = match run().await {
        Ok(_) => 0,
        Err(err) => {
            if !err.is_silent_termination() {
                eprintln!("Error: {err}");
            }
            err.exit_code()
        }
    };
    emit_biometrics_from_env();
    std::process::exit(code);
}
