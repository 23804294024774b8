//! The `chatfile-ask` flow: a question from the command line, answered
//! interactively.

use std::fs::File;
use std::io::{self, Read};

use crate::chat::config::{AskConfig, ConfigStore};
use crate::chat::input::StdinLines;
use crate::chat::session::{InteractiveSession, SessionEnd};
use crate::error::{Error, Result};
use crate::interrupt::InterruptSignal;
use crate::render::PlainTextRenderer;
use crate::types::Message;

/// System prompt that steers replies toward commented bash.
pub const BASH_SYSTEM_PROMPT: &str = r#"
For the user's following questions, think step by step in bash comments so the
output is the correct bash command with comments. Make sure the output is
always valid bash.

Use the following example to understand the desired response style:
Question:
How do I recursively alter all files to the standard chmod permissions in a directory

Answer:
# To recursively alter all files to the standard chmod permissions in a directory, use chmod:
# use the chmod command to change the file permissions recursively
chmod -R 644 /path/to/directory/
# -R applies the permissions to all files and subdirectories within the directory
# 644 gives the owner read and write access and everyone else read access
"#;

/// Build the first message's text from the question words and attachments.
///
/// Words are joined with single spaces and end with a newline.  Each
/// attachment follows after a newline; `-` reads standard input.
pub fn build_content(question: &[String], attachments: &[String]) -> Result<String> {
    build_content_with(question, attachments, |path| {
        let reader: Box<dyn Read> = if path == "-" {
            Box::new(io::stdin())
        } else {
            Box::new(File::open(path)?)
        };
        Ok(reader)
    })
}

fn build_content_with<F>(question: &[String], attachments: &[String], mut open: F) -> Result<String>
where
    F: FnMut(&str) -> io::Result<Box<dyn Read>>,
{
    let mut content = question.join(" ");
    if question.last().is_some_and(|word| !word.ends_with('\n')) {
        content.push('\n');
    }
    for path in attachments {
        content.push('\n');
        let mut reader = open(path)
            .map_err(|err| Error::io(format!("cannot open attachment {path}: {err}"), err))?;
        reader
            .read_to_string(&mut content)
            .map_err(|err| Error::io(format!("cannot read attachment {path}: {err}"), err))?;
    }
    Ok(content)
}

/// The conversation that opens a session.
///
/// With `bash` the content becomes the user turn after [`BASH_SYSTEM_PROMPT`];
/// otherwise it is the system message.
pub fn ask_messages(content: String, bash: bool) -> Vec<Message> {
    if bash {
        vec![Message::system(BASH_SYSTEM_PROMPT), Message::user(content)]
    } else {
        vec![Message::system(content)]
    }
}

/// Run `chatfile-ask` against the store's service on the terminal.
///
/// `install_interrupt` runs only after the opening message is built and the
/// service is ready, so a blocking read of an attachment can still be killed
/// by Ctrl-C.
pub async fn ask<F>(
    config: &AskConfig,
    store: &dyn ConfigStore,
    install_interrupt: F,
) -> Result<SessionEnd>
where
    F: FnOnce() -> Result<InterruptSignal>,
{
    let content = build_content(&config.question, &config.attachments)?;
    let service = store.service()?;
    let model = config.request.model(store);
    tracing::debug!(%model, bash = config.bash, once = config.once, "starting ask session");
    let input = config
        .request
        .chat_input(model, ask_messages(content, config.bash));
    let interrupt = install_interrupt()?;
    let mut session = InteractiveSession::new(
        service,
        input,
        Box::new(PlainTextRenderer::with_color(config.request.use_color)),
        Box::new(StdinLines::stdin()),
        interrupt,
    )
    .with_once(config.once);
    session.run().await
}
