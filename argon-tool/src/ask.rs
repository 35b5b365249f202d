use std::io::Write;

use argon_core::{BackendFactory, ChatSession, Dispatch, MessageId, Outcome, StreamEvent, next_event};

use crate::error::ArgError;

/// Asks a single question, streaming the answer to `out`.
///
/// With `json`, nothing is streamed and the final conversation is written as
/// JSON instead.
pub async fn run<F, W>(
    session: &mut ChatSession<F>,
    text: &str,
    json: bool,
    out: &mut W,
) -> Result<(), ArgError>
where
    F: BackendFactory,
    W: Write,
{
    let mut stream = match session.start_query(text)? {
        Dispatch::Ignored => return Err(ArgError::QueryFailed("Nothing to ask".to_string())),
        Dispatch::Unavailable(id) => return Err(failure(session, id)),
        Dispatch::Streaming(stream) => stream,
    };

    let outcome = loop {
        let event = next_event(&mut stream).await;
        if !json {
            if let StreamEvent::Chunk(chunk) = &event {
                if let Some(fragment) = &chunk.text {
                    write!(out, "{}", fragment)?;
                    out.flush()?;
                }
            }
        }
        if let Some(outcome) = session.apply_event(event) {
            break outcome;
        }
    };

    if json {
        serde_json::to_writer_pretty(&mut *out, session.conversation().messages())?;
        writeln!(out)?;
    } else {
        writeln!(out)?;
    }

    match outcome {
        Outcome::Answered { reply: Some(id) } if !json => {
            if let Some(message) = session.conversation().get(id) {
                if !message.citations.is_empty() {
                    writeln!(out)?;
                    writeln!(out, "Sources:")?;
                    for (n, url) in message.citations.iter().enumerate() {
                        writeln!(out, "  [{}] {}", n + 1, url)?;
                    }
                }
            }
            Ok(())
        }
        Outcome::Failed { error, .. } => Err(failure(session, error)),
        _ => Ok(()),
    }
}

fn failure<F: BackendFactory>(session: &ChatSession<F>, id: MessageId) -> ArgError {
    let text = session
        .conversation()
        .get(id)
        .map(|m| m.text.clone())
        .unwrap_or_else(|| "Query failed".to_string());
    ArgError::QueryFailed(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon_core::{
        ChatBackend, ChatError, ChunkStream, SessionConfig, StreamChunk, StreamOptions,
    };
    use futures::StreamExt;
    use futures::stream;

    struct Canned(Vec<Result<StreamChunk, ChatError>>);

    impl ChatBackend for Canned {
        fn send_message_stream(&self, _query: &str, _options: &StreamOptions) -> ChunkStream {
            stream::iter(self.0.clone()).boxed()
        }
    }

    struct CannedFactory(Vec<Result<StreamChunk, ChatError>>);

    impl BackendFactory for CannedFactory {
        type Backend = Canned;

        fn connect(&self) -> Result<Canned, ChatError> {
            Ok(Canned(self.0.clone()))
        }
    }

    fn session(items: Vec<Result<StreamChunk, ChatError>>) -> ChatSession<CannedFactory> {
        ChatSession::new(CannedFactory(items), SessionConfig::default())
    }

    #[tokio::test]
    async fn streams_text_then_sources() {
        let mut session = session(vec![
            Ok(StreamChunk::text("It's ")),
            Ok(StreamChunk::text("sunny.").with_citations(["https://example.com/a"])),
        ]);
        let mut out = Vec::new();

        run(&mut session, "weather in Paris", false, &mut out)
            .await
            .unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert_eq!(
            printed,
            "It's sunny.\n\nSources:\n  [1] https://example.com/a\n"
        );
    }

    #[tokio::test]
    async fn json_output_lists_conversation() {
        let mut session = session(vec![Ok(StreamChunk::text("Hi!"))]);
        let mut out = Vec::new();

        run(&mut session, "hello", true, &mut out).await.unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let messages = value.as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["sender"], "user");
        assert_eq!(messages[1]["text"], "Hi!");
    }

    #[tokio::test]
    async fn failure_becomes_error() {
        let mut session = session(vec![Err(ChatError::new("connection reset"))]);
        let mut out = Vec::new();

        let err = run(&mut session, "hello", false, &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: connection reset");
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let mut session = session(vec![]);
        let mut out = Vec::new();
        assert!(run(&mut session, "  ", false, &mut out).await.is_err());
        assert!(session.conversation().is_empty());
    }
}
