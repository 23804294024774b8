//! The `chatfile` flow: reply once to a transcript and optionally append the
//! reply to it.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::chat::config::{ChatFileConfig, ConfigStore};
use crate::error::{Error, Result};
use crate::render::{PlainTextRenderer, Renderer};
use crate::service::ChatService;
use crate::stream::stream_completion;
use crate::transcript::{parse_transcript_str, write_transcript_file};
use crate::types::ChatInput;

/// Name that stands for standard input (as a source) or the source file (as
/// a write target).
pub const STDIO_PATH: &str = "-";

/// Resolve where the extended transcript goes.
///
/// `-` means the transcript file itself, which is refused when the
/// transcript came from standard input.
pub fn resolve_write_target(file: &str, write: Option<&str>) -> Result<Option<PathBuf>> {
    match write {
        None => Ok(None),
        Some(STDIO_PATH) if file == STDIO_PATH => Err(Error::configuration(
            "cannot write the reply back to standard input",
        )),
        Some(STDIO_PATH) => Ok(Some(PathBuf::from(file))),
        Some(path) => Ok(Some(PathBuf::from(path))),
    }
}

/// Read the raw transcript text; `-` reads standard input.
pub fn read_transcript_source(file: &str) -> Result<String> {
    if file == STDIO_PATH {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|err| Error::io(format!("cannot read standard input: {err}"), err))?;
        Ok(text)
    } else {
        fs::read_to_string(file).map_err(|err| Error::io(format!("cannot read {file}: {err}"), err))
    }
}

/// Stream one reply to `transcript` through `renderer` and return it.
///
/// `template` supplies the model and request settings; its messages are
/// replaced by the parsed transcript.  The returned text is exactly what the
/// service sent, without the newline the renderer may add.
pub async fn reply_to_transcript<R>(
    service: &dyn ChatService,
    template: ChatInput,
    transcript: &str,
    renderer: &mut R,
) -> Result<String>
where
    R: Renderer + ?Sized,
{
    let messages = parse_transcript_str(transcript)?;
    tracing::debug!(messages = messages.len(), "parsed transcript");
    let input = ChatInput {
        messages,
        ..template
    };
    let state = stream_completion(service, &input, &mut *renderer).await?;
    renderer.finish_response(&state)?;
    Ok(state.buffer)
}

/// Run `chatfile` against the store's service on the terminal.
///
/// The reply is always shown.  It is written back only when the extended
/// transcript parses to the original messages plus that reply; otherwise
/// the target keeps its old contents and an error is returned.
pub async fn chat_file(config: &ChatFileConfig, store: &dyn ConfigStore) -> Result<()> {
    let target = resolve_write_target(&config.file, config.write.as_deref())?;
    let original = read_transcript_source(&config.file)?;
    let service = store.service()?;
    let template = config.request.chat_input(config.request.model(store), Vec::new());
    let mut renderer = PlainTextRenderer::with_color(config.request.use_color);
    let reply = reply_to_transcript(service.as_ref(), template, &original, &mut renderer).await?;
    if let Some(target) = target {
        write_transcript_file(&target, &original, &reply)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::service::DeltaStream;
    use crate::types::Message;

    struct Echo;

    /// Replies with fixed text, whatever it is asked.
    struct Fixed(&'static str);

    #[async_trait::async_trait]
    impl ChatService for Fixed {
        async fn chat_stream(&self, _: &ChatInput) -> Result<DeltaStream> {
            Ok(Box::pin(stream::iter(vec![Ok(self.0.to_string())])))
        }
    }

    #[async_trait::async_trait]
    impl ChatService for Echo {
        async fn chat_stream(&self, input: &ChatInput) -> Result<DeltaStream> {
            let count = input.messages.len();
            let deltas = vec![Ok("seen ".to_string()), Ok(format!("{count} messages"))];
            Ok(Box::pin(stream::iter(deltas)))
        }
    }

    #[test]
    fn write_targets() {
        assert_eq!(resolve_write_target("chat.txt", None).unwrap(), None);
        assert_eq!(
            resolve_write_target("chat.txt", Some("-")).unwrap(),
            Some(PathBuf::from("chat.txt"))
        );
        assert_eq!(
            resolve_write_target("-", Some("out.txt")).unwrap(),
            Some(PathBuf::from("out.txt"))
        );
        let err = resolve_write_target("-", Some("-")).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[tokio::test]
    async fn reply_is_rendered_and_returned() {
        let transcript = "--- system\nBe terse\n--- user\nHello\n";
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let reply = reply_to_transcript(
            &Echo,
            ChatInput::new("test-model", Vec::new()),
            transcript,
            &mut renderer,
        )
        .await
        .unwrap();
        assert_eq!(reply, "seen 2 messages");
        let shown = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(shown, "seen 2 messages\n");
    }

    #[tokio::test]
    async fn invalid_transcript_is_not_sent() {
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let err = reply_to_transcript(
            &Echo,
            ChatInput::new("test-model", Vec::new()),
            "--- wizard\nhi\n",
            &mut renderer,
        )
        .await
        .unwrap_err();
        assert!(err.is_invalid_role());
        assert!(renderer.into_inner().is_empty());
    }

    #[tokio::test]
    async fn reply_round_trips_through_the_file() {
        let path = std::env::temp_dir().join("chatfile_file_round_trip.txt");
        let original = "--- user\nHello\n";
        std::fs::write(&path, original).unwrap();

        let text = read_transcript_source(&path.to_string_lossy()).unwrap();
        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let reply = reply_to_transcript(
            &Echo,
            ChatInput::new("test-model", Vec::new()),
            &text,
            &mut renderer,
        )
        .await
        .unwrap();
        write_transcript_file(&path, &text, &reply).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "--- user\nHello\n\n--- assistant\nseen 1 messages\n");
        assert_eq!(
            parse_transcript_str(&written).unwrap(),
            vec![
                Message::user("Hello\n"),
                Message::assistant("seen 1 messages\n"),
            ]
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn reply_with_a_boundary_line_is_not_written_back() {
        let path = std::env::temp_dir().join(format!(
            "chatfile_file_boundary_reply_{}.txt",
            std::process::id()
        ));
        let original = "--- user\nSummarize\n";
        std::fs::write(&path, original).unwrap();

        let mut renderer = PlainTextRenderer::with_writer(Vec::new(), false);
        let reply = reply_to_transcript(
            &Fixed("Intro\n--- Summary\nDone"),
            ChatInput::new("test-model", Vec::new()),
            original,
            &mut renderer,
        )
        .await
        .unwrap();
        let shown = String::from_utf8(renderer.into_inner()).unwrap();
        assert_eq!(shown, "Intro\n--- Summary\nDone\n");

        let err = write_transcript_file(&path, original, &reply).unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
        let kept = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(kept, original);
        assert_eq!(
            parse_transcript_str(&kept).unwrap(),
            vec![Message::user("Summarize\n")]
        );
    }
}
