//! Line-oriented user input.

use std::io::{self, BufRead, BufReader, Stdin};

/// A blocking source of input lines.
///
/// Reads happen on a worker thread so the session can watch for interrupts
/// at the same time.
pub trait LineSource: Send + 'static {
    /// Read the next line, including its newline if one was present.
    ///
    /// End of input is reported as [`io::ErrorKind::UnexpectedEof`].
    fn read_line(&mut self) -> io::Result<String>;
}

/// Lines read from any buffered reader.
#[derive(Debug)]
pub struct StdinLines<R: BufRead + Send + 'static = BufReader<Stdin>> {
    reader: R,
}

impl StdinLines {
    /// Lines from the process's standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: BufRead + Send + 'static> StdinLines<R> {
    /// Lines from `reader`.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead + Send + 'static> LineSource for StdinLines<R> {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "end of input",
            ));
        }
        Ok(line)
    }
}
