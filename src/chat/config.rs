//! Configuration types for the chat commands.
//!
//! This module provides CLI argument parsing via `arrrg`, the resolved
//! configuration structures, and the [`ConfigStore`] that supplies the model
//! name and the service handle.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::client::OpenAi;
use crate::error::{Error, Result};
use crate::service::ChatService;
use crate::types::{ChatInput, Message};

/// Model used when neither the command line nor the environment names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Highest temperature the chat-completions API accepts.
const MAX_TEMPERATURE: f32 = 2.0;

/// Command-line arguments for `chatfile-ask`.
///
/// The question itself is taken from the free arguments.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct AskArgs {
    /// Model to use for the conversation.
    #[arrrg(optional, "Model to use (default: $CHATFILE_MODEL or gpt-4o-mini)", "MODEL")]
    pub model: Option<String>,

    /// Maximum tokens per response.
    #[arrrg(optional, "Max tokens per response (default: service default)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature between 0 and 2", "TEMP")]
    pub temperature: Option<String>,

    /// Deadline for each reply in seconds.
    #[arrrg(optional, "Seconds to wait for each reply (default: 120)", "SECS")]
    pub timeout: Option<u64>,

    /// Steer the model toward commented bash.
    #[arrrg(flag, "Answer only with valid, commented bash")]
    pub bash: bool,

    /// Ask a single question and exit.
    #[arrrg(flag, "Ask once and exit without prompting for more")]
    pub once: bool,

    /// Files appended to the question.
    #[arrrg(optional, "Comma-separated files to attach; '-' reads stdin", "FILES")]
    pub attach: Option<String>,

    /// Wait for the whole reply instead of streaming it.
    #[arrrg(flag, "Disable streaming")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Command-line arguments for `chatfile`.
///
/// The transcript path and the optional write target are taken from the free
/// arguments.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatFileArgs {
    /// Model to use for the reply.
    #[arrrg(optional, "Model to use (default: $CHATFILE_MODEL or gpt-4o-mini)", "MODEL")]
    pub model: Option<String>,

    /// Maximum tokens for the reply.
    #[arrrg(optional, "Max tokens for the reply (default: service default)", "TOKENS")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature between 0 and 2", "TEMP")]
    pub temperature: Option<String>,

    /// Deadline for the reply in seconds.
    #[arrrg(optional, "Seconds to wait for the reply (default: 120)", "SECS")]
    pub timeout: Option<u64>,

    /// Wait for the whole reply instead of streaming it.
    #[arrrg(flag, "Disable streaming")]
    pub no_stream: bool,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Request settings shared by both commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Overrides the store's model when set.
    pub model: Option<String>,

    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Per-reply deadline; zero means the default.
    pub timeout: Option<Duration>,

    /// Whether replies are streamed.
    pub stream: bool,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl RequestOptions {
    /// Creates options that stream with colors and service defaults.
    pub fn new() -> Self {
        Self {
            stream: true,
            use_color: true,
            ..Self::default()
        }
    }

    /// Returns the model to request, preferring the command line.
    pub fn model(&self, store: &dyn ConfigStore) -> String {
        self.model.clone().unwrap_or_else(|| store.model())
    }

    /// Builds the request for `messages`.
    pub fn chat_input(&self, model: String, messages: Vec<Message>) -> ChatInput {
        ChatInput::new(model, messages)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_timeout(self.timeout)
    }
}

/// Resolved configuration for `chatfile-ask`.
#[derive(Debug, Clone, PartialEq)]
pub struct AskConfig {
    /// Words of the question, in order.
    pub question: Vec<String>,

    /// Paths whose contents follow the question; `-` is stdin.
    pub attachments: Vec<String>,

    /// Whether to start from the bash system prompt.
    pub bash: bool,

    /// Whether to stop after the first reply.
    pub once: bool,

    /// Request settings.
    pub request: RequestOptions,
}

impl AskConfig {
    /// Resolves the parsed flags and the free arguments.
    pub fn from_args(args: AskArgs, question: Vec<String>) -> Result<Self> {
        let attachments = args
            .attach
            .as_deref()
            .map(split_list)
            .unwrap_or_default();
        Ok(Self {
            question,
            attachments,
            bash: args.bash,
            once: args.once,
            request: RequestOptions {
                model: non_empty(args.model),
                max_tokens: args.max_tokens,
                temperature: parse_temperature(args.temperature.as_deref())?,
                timeout: args.timeout.map(Duration::from_secs),
                stream: !args.no_stream,
                use_color: !args.no_color,
            },
        })
    }
}

/// Resolved configuration for `chatfile`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatFileConfig {
    /// The transcript to read; `-` is stdin.
    pub file: String,

    /// Where to write the extended transcript; `-` is `file` itself.
    pub write: Option<String>,

    /// Request settings.
    pub request: RequestOptions,
}

impl ChatFileConfig {
    /// Resolves the parsed flags and the `<FILE> [WRITE]` free arguments.
    pub fn from_args(args: ChatFileArgs, positional: Vec<String>) -> Result<Self> {
        let mut positional = positional.into_iter();
        let file = positional
            .next()
            .ok_or_else(|| Error::configuration("missing transcript file (use '-' for stdin)"))?;
        let write = positional.next();
        if let Some(extra) = positional.next() {
            return Err(Error::configuration(format!(
                "unexpected argument: {extra}"
            )));
        }
        Ok(Self {
            file,
            write,
            request: RequestOptions {
                model: non_empty(args.model),
                max_tokens: args.max_tokens,
                temperature: parse_temperature(args.temperature.as_deref())?,
                timeout: args.timeout.map(Duration::from_secs),
                stream: !args.no_stream,
                use_color: !args.no_color,
            },
        })
    }
}

/// Source of the model name and the service handle.
pub trait ConfigStore {
    /// The configured model.
    fn model(&self) -> String;

    /// A handle on the configured chat service.
    fn service(&self) -> Result<Arc<dyn ChatService>>;
}

/// A [`ConfigStore`] backed by environment variables.
///
/// - `CHATFILE_API_KEY`, falling back to `OPENAI_API_KEY`
/// - `CHATFILE_ENDPOINT`, the API root (default: the OpenAI API)
/// - `CHATFILE_MODEL` (default: gpt-4o-mini)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfigStore {
    api_key: Option<String>,
    endpoint: Option<String>,
    model: Option<String>,
    streaming: bool,
}

impl EnvConfigStore {
    /// Creates a store from explicit values.
    pub fn new(api_key: Option<String>, endpoint: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key: non_empty(api_key),
            endpoint: non_empty(endpoint),
            model: non_empty(model),
            streaming: true,
        }
    }

    /// Creates a store from the process environment.
    pub fn from_env() -> Self {
        let api_key = match env::var("CHATFILE_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Some(key),
            Ok(_) => {
                tracing::warn!("CHATFILE_API_KEY is empty; trying OPENAI_API_KEY");
                env::var("OPENAI_API_KEY").ok()
            }
            Err(_) => env::var("OPENAI_API_KEY").ok(),
        };
        Self::new(
            api_key,
            env::var("CHATFILE_ENDPOINT").ok(),
            env::var("CHATFILE_MODEL").ok(),
        )
    }

    /// Chooses whether the service streams its replies.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

impl ConfigStore for EnvConfigStore {
    fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    fn service(&self) -> Result<Arc<dyn ChatService>> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            Error::authentication("no API key: set CHATFILE_API_KEY or OPENAI_API_KEY")
        })?;
        let client = OpenAi::with_options(Some(api_key), self.endpoint.clone())?
            .with_streaming(self.streaming);
        Ok(Arc::new(client))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn parse_temperature(value: Option<&str>) -> Result<Option<f32>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let temperature: f32 = value
        .trim()
        .parse()
        .map_err(|_| Error::configuration(format!("invalid temperature: {value}")))?;
    if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(Error::configuration(format!(
            "temperature must be between 0 and {MAX_TEMPERATURE}: {value}"
        )));
    }
    Ok(Some(temperature))
}
