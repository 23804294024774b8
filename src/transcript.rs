//! Plain-text transcript files.
//!
//! A transcript is a sequence of role-tagged messages separated by boundary
//! lines:
//!
//! ```text
//! --- system
//! You are terse.
//! --- user
//! What is a monad?
//! ```
//!
//! Boundaries are matched after trimming and case-folding, so `  --- USER `
//! opens a user message.  Text that precedes the first boundary becomes a
//! system message.  A boundary that names anything other than `system`,
//! `user`, or `assistant` fails the whole parse.
//!
//! One blank line directly above a boundary separates messages and is not part
//! of the message it follows.  This is the separator [`append_message`] writes,
//! so appending a reply and parsing again yields the original messages plus
//! the reply.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Message, Role, validate_role};

const BOUNDARY_MARKER: &str = "---";

///////////////////////////////////////// Parsing /////////////////////////////////////////

/// Parse a transcript into its ordered messages.
///
/// Every content line is stored with a single trailing `\n`, so content always
/// ends in a newline.  A `\r` at the end of a line is dropped, whether or not a
/// `\n` follows it.  A boundary with no content before the next boundary (or
/// the end of input) produces no message.  Empty input yields no messages.
///
/// # Errors
///
/// Returns [`Error::InvalidRole`] when a boundary names an unknown role and
/// [`Error::Io`] when the reader fails.  No partial result is returned.
pub fn parse_transcript<R: BufRead>(reader: R) -> Result<Vec<Message>> {
    let mut messages = Vec::new();
    let mut current_role: Option<Role> = None;
    let mut current_content = String::new();

    for line in reader.lines() {
        let mut line =
            line.map_err(|err| Error::io(format!("failed to read transcript: {err}"), err))?;
        if line.ends_with('\r') {
            line.pop();
        }

        if let Some(token) = boundary_token(&line) {
            let role = validate_role(&token)?;
            strip_separator(&mut current_content);
            flush(&mut messages, current_role, &mut current_content);
            current_role = Some(role);
            continue;
        }

        if current_role.is_none() && !line.trim().is_empty() {
            current_role = Some(Role::System);
        }
        if current_role.is_some() {
            current_content.push_str(&line);
            current_content.push('\n');
        }
    }

    flush(&mut messages, current_role, &mut current_content);
    Ok(messages)
}

/// Parse a transcript held in memory.
pub fn parse_transcript_str(text: &str) -> Result<Vec<Message>> {
    parse_transcript(text.as_bytes())
}

/// Returns the case-folded role token if `line` has the shape of a boundary.
///
/// The shape is `---`, optional whitespace, then a single word.  Lines such as
/// a bare `---` or `--- user notes` are content, not boundaries.
fn boundary_token(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(BOUNDARY_MARKER)?.trim_start();
    if rest.is_empty() || !rest.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(rest.to_lowercase())
}

fn strip_separator(content: &mut String) {
    if content == "\n" || content.ends_with("\n\n") {
        content.pop();
    }
}

fn flush(messages: &mut Vec<Message>, role: Option<Role>, content: &mut String) {
    if let Some(role) = role
        && !content.is_empty()
    {
        messages.push(Message::new(role, std::mem::take(content)));
    }
}

///////////////////////////////////////// Writing /////////////////////////////////////////

/// Write `original` followed by a new message under `role`.
///
/// Exactly one blank line separates the original text from the new boundary.
/// The role is checked before anything is written.
pub fn append_message<W: Write>(
    writer: W,
    original: &str,
    role: &str,
    content: &str,
) -> Result<()> {
    let role = validate_role(role)?;
    let mut output = BufWriter::new(writer);
    write_appended(&mut output, original, role, content)
        .and_then(|()| output.flush())
        .map_err(|err| Error::io(format!("failed to write transcript: {err}"), err))
}

/// Write `original` followed by a new assistant message.
pub fn append_assistant<W: Write>(writer: W, original: &str, content: &str) -> Result<()> {
    append_message(writer, original, Role::Assistant.as_str(), content)
}

/// Return `original` with a new message under `role` appended.
pub fn serialize_append(original: &str, role: &str, content: &str) -> Result<String> {
    let mut buffer = Vec::with_capacity(original.len() + content.len() + 32);
    append_message(&mut buffer, original, role, content)?;
    String::from_utf8(buffer).map_err(|err| {
        Error::encoding(
            format!("transcript is not valid UTF-8: {err}"),
            Some(Box::new(err)),
        )
    })
}

/// Return `original` plus an assistant reply, provided the result parses to
/// exactly the original messages followed by that reply.
///
/// # Errors
///
/// Returns [`Error::Encoding`] when the reply contains a line that reads as a
/// message boundary, such as `--- summary`.
pub fn append_reply_checked(original: &str, reply: &str) -> Result<String> {
    let mut expected = parse_transcript_str(original)?;
    expected.push(Message::assistant(format!("{reply}\n")));
    let appended = serialize_append(original, Role::Assistant.as_str(), reply)?;
    match parse_transcript_str(&appended) {
        Ok(messages) if messages == expected => Ok(appended),
        Ok(_) => Err(Error::encoding(
            "the reply contains a message boundary and would split into several messages",
            None,
        )),
        Err(err) => Err(Error::encoding(
            format!("the reply would leave the transcript unparseable: {err}"),
            Some(Box::new(err)),
        )),
    }
}

/// Rewrite the transcript at `path` as `original` plus an assistant reply.
///
/// The new text goes to a sibling temporary file that is then renamed over
/// `path`.  When the reply cannot be appended cleanly (see
/// [`append_reply_checked`]) or any write fails, `path` is left untouched.
pub fn write_transcript_file<P: AsRef<Path>>(path: P, original: &str, reply: &str) -> Result<()> {
    let path = path.as_ref();
    let text = append_reply_checked(original, reply)?;
    let temp_path = temp_sibling(path);
    if let Err(err) = write_and_sync(&temp_path, &text) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(
            format!("cannot write {}: {err}", temp_path.display()),
            err,
        ));
    }
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(
            format!("cannot replace {}: {err}", path.display()),
            err,
        ));
    }
    tracing::debug!(path = %path.display(), bytes = reply.len(), "appended reply to transcript");
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or(path.as_os_str()));
    name.push(format!(".chatfile-{}.tmp", std::process::id()));
    path.with_file_name(name)
}

fn write_and_sync(path: &Path, text: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(text.as_bytes())?;
    file.sync_all()
}

fn write_appended<W: Write>(
    output: &mut W,
    original: &str,
    role: Role,
    content: &str,
) -> std::io::Result<()> {
    output.write_all(original.as_bytes())?;
    output.write_all(b"\n")?;
    if !original.ends_with('\n') {
        output.write_all(b"\n")?;
    }
    write!(output, "{BOUNDARY_MARKER} {role}\n{content}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_chat() {
        let messages =
            parse_transcript_str("--- system\nSystem message\n--- user\nUser message\n").unwrap();
        assert_eq!(
            messages,
            vec![
                Message::system("System message\n"),
                Message::user("User message\n"),
            ]
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(parse_transcript_str("").unwrap(), vec![]);
    }

    #[test]
    fn leading_blank_content_line_is_kept() {
        let messages = parse_transcript_str("--- user\n\nfoo").unwrap();
        assert_eq!(messages, vec![Message::user("\nfoo\n")]);
    }

    #[test]
    fn unknown_role_fails_whole_parse() {
        let err = parse_transcript_str("--- user\nkept?\n--- bogus\nhi").unwrap_err();
        match err {
            Error::InvalidRole { role } => assert_eq!(role, "bogus"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn boundary_is_case_insensitive() {
        let upper = parse_transcript_str("--- SYSTEM\nBe terse\n").unwrap();
        let lower = parse_transcript_str("--- system\nBe terse\n").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper, vec![Message::system("Be terse\n")]);
    }

    #[test]
    fn boundary_tolerates_surrounding_whitespace() {
        let messages = parse_transcript_str("  ---   Assistant  \nok\n---user\nnext\n").unwrap();
        assert_eq!(
            messages,
            vec![Message::assistant("ok\n"), Message::user("next\n")]
        );
    }

    #[test]
    fn leading_blank_lines_open_nothing() {
        let messages = parse_transcript_str("\n   \n--- user\nhello\n").unwrap();
        assert_eq!(messages, vec![Message::user("hello\n")]);
    }

    #[test]
    fn unmarked_leading_content_is_system() {
        let messages = parse_transcript_str("\nBe terse\n--- user\nhello\n").unwrap();
        assert_eq!(
            messages,
            vec![Message::system("Be terse\n"), Message::user("hello\n")]
        );
    }

    #[test]
    fn empty_boundaries_are_dropped() {
        let messages = parse_transcript_str("--- system\n--- user\nhi\n--- assistant\n").unwrap();
        assert_eq!(messages, vec![Message::user("hi\n")]);
    }

    #[test]
    fn blank_line_before_boundary_is_a_separator() {
        let messages = parse_transcript_str("--- user\nhi\n\n--- assistant\nhello\n").unwrap();
        assert_eq!(
            messages,
            vec![Message::user("hi\n"), Message::assistant("hello\n")]
        );

        let messages = parse_transcript_str("--- user\nhi\n\n\n--- assistant\nhello\n\n").unwrap();
        assert_eq!(
            messages,
            vec![Message::user("hi\n\n"), Message::assistant("hello\n\n")]
        );
    }

    #[test]
    fn non_boundary_dashes_are_content() {
        let messages = parse_transcript_str("--- user\na\n---\nb\n--- user notes\n").unwrap();
        assert_eq!(messages, vec![Message::user("a\n---\nb\n--- user notes\n")]);
    }

    #[test]
    fn crlf_lines_are_normalized() {
        let messages = parse_transcript_str("--- user\r\nhello\r\n").unwrap();
        assert_eq!(messages, vec![Message::user("hello\n")]);
    }

    #[test]
    fn append_adds_single_blank_line() {
        let text = serialize_append("--- user\nhi\n", "assistant", "hello").unwrap();
        assert_eq!(text, "--- user\nhi\n\n--- assistant\nhello\n");

        let text = serialize_append("--- user\nhi", "assistant", "hello").unwrap();
        assert_eq!(text, "--- user\nhi\n\n--- assistant\nhello\n");
    }

    #[test]
    fn append_to_empty_original() {
        let text = serialize_append("", "assistant", "hello").unwrap();
        assert_eq!(text, "\n\n--- assistant\nhello\n");
        assert_eq!(
            parse_transcript_str(&text).unwrap(),
            vec![Message::assistant("hello\n")]
        );
    }

    #[test]
    fn append_rejects_invalid_role_before_writing() {
        let mut buffer = Vec::new();
        let err = append_message(&mut buffer, "--- user\nhi\n", "robot", "beep").unwrap_err();
        assert!(err.is_invalid_role());
        assert!(buffer.is_empty());
    }

    #[test]
    fn append_then_parse_extends_messages() {
        let originals = [
            "--- system\nBe terse\n--- user\nWhat is 2+2?\n",
            "Be terse\n--- user\nWhat is 2+2?",
            "--- user\n\n# Summary\n\n",
            "--- user\nhi\n--- assistant\n",
            "--- user\nhi\n\n--- assistant\nhello\n",
            "",
        ];
        for original in originals {
            for reply in ["4", "4\n", "line one\n\nline two"] {
                let mut expected = parse_transcript_str(original).unwrap();
                expected.push(Message::assistant(format!("{reply}\n")));
                let appended = serialize_append(original, "assistant", reply).unwrap();
                assert_eq!(
                    parse_transcript_str(&appended).unwrap(),
                    expected,
                    "{original:?} + {reply:?}"
                );
            }
        }
    }

    #[test]
    fn write_transcript_file_rewrites_target() {
        let path = std::env::temp_dir().join(format!(
            "chatfile-transcript-{}.txt",
            std::process::id()
        ));
        std::fs::write(&path, "stale contents that are longer than the new ones\n").unwrap();
        write_transcript_file(&path, "--- user\nhi\n", "hello").unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, "--- user\nhi\n\n--- assistant\nhello\n");
    }

    #[test]
    fn bare_carriage_return_round_trips() {
        let original = "--- user\nhi\r";
        assert_eq!(
            parse_transcript_str(original).unwrap(),
            vec![Message::user("hi\n")]
        );
        let appended = serialize_append(original, "assistant", "hello").unwrap();
        assert_eq!(
            parse_transcript_str(&appended).unwrap(),
            vec![Message::user("hi\n"), Message::assistant("hello\n")]
        );
    }

    #[test]
    fn checked_append_rejects_boundary_in_reply() {
        let err = append_reply_checked("--- user\nhi\n", "Intro\n--- Summary\nDone").unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));

        let err = append_reply_checked("--- user\nhi\n", "ok\n--- user\nmore").unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));

        let text = append_reply_checked("--- user\nhi\n", "a\n---\n--- not a boundary").unwrap();
        assert_eq!(
            parse_transcript_str(&text).unwrap(),
            vec![
                Message::user("hi\n"),
                Message::assistant("a\n---\n--- not a boundary\n"),
            ]
        );
    }

    #[test]
    fn unparseable_reply_leaves_file_untouched() {
        let dir = std::env::temp_dir().join(format!("chatfile-untouched-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("chat.txt");
        let original = "--- user\nhi\n";
        std::fs::write(&path, original).unwrap();

        let err = write_transcript_file(&path, original, "Intro\n--- Output\nDone").unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
        let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_write_leaves_no_temporary_file() {
        let dir = std::env::temp_dir().join(format!("chatfile-missing-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let err = write_transcript_file(dir.join("chat.txt"), "--- user\nhi\n", "hello")
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert!(!dir.exists());
    }

    #[test]
    fn temporary_file_is_a_hidden_sibling() {
        let temp = temp_sibling(Path::new("notes/chat.txt"));
        assert_eq!(temp.parent(), Some(Path::new("notes")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".chat.txt.chatfile-"));
        assert!(name.ends_with(".tmp"));
    }
}
