//! The interactive ask-and-follow-up loop.
//!
//! A session alternates between two phases.  While *responding* it streams a
//! reply to the renderer; while *awaiting input* it prompts for a follow-up
//! line and races the read against an interrupt.  A follow-up extends the
//! conversation with the reply and the new line and responds again.  A blank
//! line or an interrupt stops the session; closed input terminates it
//! silently.
//!
//! An interrupt while responding is not a failure: the partial reply stays on
//! the terminal, `[interrupted]` is printed, and the session ends as
//! [`SessionEnd::Stopped`] with exit code 0.  Any other error while
//! responding ends the session with that error.

use std::io;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::chat::input::LineSource;
use crate::error::{Error, Result};
use crate::interrupt::InterruptSignal;
use crate::observability::{SESSION_INTERRUPTS, SESSION_TURNS};
use crate::render::Renderer;
use crate::service::ChatService;
use crate::stream::stream_completion_until;
use crate::types::{ChatInput, Message};

/// Prompt shown while waiting for a follow-up.
pub const DEFAULT_PROMPT: &str = "chatfile>";

/// Outcome of one respond-then-read step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A follow-up was read; respond again.
    Continue,
    /// The user ended the session.
    Stopped,
}

/// How a session ended.  Both are clean exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Blank line, interrupt, or single-question mode.
    Stopped,
    /// Input closed while waiting for a follow-up.
    Terminated,
}

type PendingLine = oneshot::Receiver<(Box<dyn LineSource>, io::Result<String>)>;

/// An interactive conversation with a chat service.
pub struct InteractiveSession {
    service: Arc<dyn ChatService>,
    input: ChatInput,
    renderer: Box<dyn Renderer>,
    lines: Option<Box<dyn LineSource>>,
    interrupt: InterruptSignal,
    prompt: String,
    once: bool,
}

impl InteractiveSession {
    /// Creates a session that starts by responding to `input`.
    pub fn new(
        service: Arc<dyn ChatService>,
        input: ChatInput,
        renderer: Box<dyn Renderer>,
        lines: Box<dyn LineSource>,
        interrupt: InterruptSignal,
    ) -> Self {
        Self {
            service,
            input,
            renderer,
            lines: Some(lines),
            interrupt,
            prompt: DEFAULT_PROMPT.to_string(),
            once: false,
        }
    }

    /// Stops after the first reply instead of prompting.
    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    /// Sets the follow-up prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// The conversation so far.
    pub fn conversation(&self) -> &[Message] {
        &self.input.messages
    }

    /// Runs the session until it stops or terminates.
    ///
    /// # Errors
    ///
    /// Any failure other than closed input ends the session and is returned.
    pub async fn run(&mut self) -> Result<SessionEnd> {
        loop {
            match self.respond_and_wait().await {
                Ok(Step::Continue) => continue,
                Ok(Step::Stopped) => return Ok(SessionEnd::Stopped),
                Err(err) if err.is_silent_termination() => {
                    tracing::debug!(error = %err, "input closed");
                    return Ok(SessionEnd::Terminated);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Streams one reply, then waits for the follow-up.
    ///
    /// Closed input is reported as [`Error::SilentTermination`].
    pub async fn respond_and_wait(&mut self) -> Result<Step> {
        let Some(response) = self.respond().await? else {
            return Ok(Step::Stopped);
        };
        if self.once {
            return Ok(Step::Stopped);
        }
        self.renderer.print_prompt(&self.prompt)?;

        let Some(line) = self.wait_for_line().await? else {
            return Ok(Step::Stopped);
        };
        let line = line.trim();
        if line.is_empty() {
            return Ok(Step::Stopped);
        }
        self.input.messages.push(Message::assistant(response));
        self.input.messages.push(Message::user(line));
        Ok(Step::Continue)
    }

    /// Streams a reply; `None` when the user interrupted it.
    async fn respond(&mut self) -> Result<Option<String>> {
        SESSION_TURNS.click();
        self.interrupt.arm();
        let result = stream_completion_until(
            self.service.as_ref(),
            &self.input,
            self.renderer.as_mut(),
            Some(&mut self.interrupt),
        )
        .await;
        match result {
            Ok(state) => {
                self.renderer.finish_response(&state)?;
                let mut response = state.buffer.clone();
                if state.needs_trailing_newline() {
                    response.push('\n');
                }
                Ok(Some(response))
            }
            Err(err) if err.is_abort() => {
                SESSION_INTERRUPTS.click();
                self.renderer.print_interrupted()?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Reads one line; `None` when the user interrupted the wait.
    async fn wait_for_line(&mut self) -> Result<Option<String>> {
        let pending = self.spawn_read()?;
        self.interrupt.arm();
        let read = tokio::select! {
            read = pending => Some(read),
            () = self.interrupt.interrupted() => None,
        };
        let Some(read) = read else {
            SESSION_INTERRUPTS.click();
            tracing::debug!("interrupted while waiting for input");
            return Ok(None);
        };
        let (lines, line) = read.map_err(|_| {
            Error::io(
                "input reader stopped",
                io::Error::other("input thread exited without a result"),
            )
        })?;
        self.lines = Some(lines);
        line.map(Some).map_err(read_error)
    }

    /// Starts a blocking read on a dedicated thread.
    ///
    /// The thread is detached; if the wait is interrupted it stays blocked
    /// until the process exits.
    fn spawn_read(&mut self) -> Result<PendingLine> {
        let mut lines = self
            .lines
            .take()
            .ok_or_else(|| Error::configuration("a previous read is still pending"))?;
        let (sender, receiver) = oneshot::channel();
        std::thread::Builder::new()
            .name("chatfile-input".to_string())
            .spawn(move || {
                let line = lines.read_line();
                let _ = sender.send((lines, line));
            })
            .map_err(|err| Error::io("cannot start input thread", err))?;
        Ok(receiver)
    }
}

fn read_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionAborted => Error::silent_termination(err),
        _ => Error::io("failed to read input", err),
    }
}
