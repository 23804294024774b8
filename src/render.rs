//! Terminal output for streamed replies.
//!
//! This module provides the renderer trait used by the chat flows and a
//! plain-text implementation with optional ANSI styling.

use std::io::{self, Stdout, Write};

use crate::error::{Error, Result};
use crate::stream::{DeltaSink, StreamState};

/// ANSI escape code for green text (used for the input prompt).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Trait for rendering a conversation to the terminal.
///
/// Streamed text arrives through [`DeltaSink::on_delta`]; the remaining
/// methods frame it.
pub trait Renderer: DeltaSink + Send {
    /// Called after a reply finished streaming.
    ///
    /// Emits one newline when the reply did not end with one, so the next
    /// prompt starts on its own line.
    fn finish_response(&mut self, state: &StreamState) -> Result<()>;

    /// Print the prompt that asks for the next line of input.
    fn print_prompt(&mut self, prompt: &str) -> Result<()>;

    /// Called when a reply is cut short by the user.
    fn print_interrupted(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Plain text renderer with optional ANSI styling.
///
/// Reply text is written verbatim and flushed after every fragment so tokens
/// appear as they arrive.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer on stdout with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer on stdout with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer that writes to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    /// Consumes the renderer and returns its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_flushed(&mut self, text: &str) -> Result<()> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|err| Error::sink("failed to write to terminal", Some(Box::new(err))))
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> DeltaSink for PlainTextRenderer<W> {
    fn on_delta(&mut self, delta: &str) -> Result<()> {
        self.write_flushed(delta)
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn finish_response(&mut self, state: &StreamState) -> Result<()> {
        if state.needs_trailing_newline() {
            self.write_flushed("\n")?;
        }
        Ok(())
    }

    fn print_prompt(&mut self, prompt: &str) -> Result<()> {
        if self.use_color {
            self.write_flushed(&format!("{ANSI_GREEN}{prompt}{ANSI_RESET} "))
        } else {
            self.write_flushed(&format!("{prompt} "))
        }
    }

    fn print_interrupted(&mut self) -> Result<()> {
        self.write_flushed("\n[interrupted]\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(renderer: PlainTextRenderer<Vec<u8>>) -> String {
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
    }

    #[test]
    fn deltas_are_written_verbatim() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), true);
        renderer.on_delta("Hi").unwrap();
        renderer.on_delta(" there").unwrap();
        assert_eq!(rendered(renderer), "Hi there");
    }

    #[test]
    fn finish_response_adds_missing_newline() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let state = StreamState {
            buffer: "Hi there".to_string(),
            last_delta: Some(" there".to_string()),
        };
        renderer.finish_response(&state).unwrap();
        assert_eq!(rendered(renderer), "\n");

        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let state = StreamState {
            buffer: "done\n".to_string(),
            last_delta: Some("done\n".to_string()),
        };
        renderer.finish_response(&state).unwrap();
        assert_eq!(rendered(renderer), "");
    }

    #[test]
    fn prompt_styling() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        renderer.print_prompt("chatfile>").unwrap();
        assert_eq!(rendered(renderer), "chatfile> ");

        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), true);
        renderer.print_prompt("chatfile>").unwrap();
        assert_eq!(rendered(renderer), "\x1b[32mchatfile>\x1b[0m ");
    }

    struct Closed;

    impl Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_are_sink_errors() {
        let mut renderer = PlainTextRenderer::with_writer(Closed, false);
        let err = renderer.on_delta("lost").unwrap_err();
        assert!(err.is_sink());
        let err = renderer.print_interrupted().unwrap_err();
        assert!(err.is_sink());
    }

    #[test]
    fn interrupted_marker_on_its_own_line() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        renderer.on_delta("partial").unwrap();
        renderer.print_interrupted().unwrap();
        assert_eq!(rendered(renderer), "partial\n[interrupted]\n");
    }
}
