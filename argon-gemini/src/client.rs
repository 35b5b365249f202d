use std::sync::Arc;

use argon_core::{ChatBackend, ChatError, ChunkStream, StreamChunk, StreamOptions};
use futures::{Stream, StreamExt, TryStreamExt, stream};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::convert::{build_request_body, parse_error};
use crate::error::GeminiError;
use crate::sse::decode_chunks;
use crate::types::Content;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a friendly and helpful AI assistant. \
    Always consider the current date, time, and user's location (if provided) when generating \
    responses. Provide concise and relevant information. If specific data is needed, try to use \
    Google Search or Google Maps tools.";

/// Client for the Gemini API.
///
/// Keeps the chat history of its own session: every completed exchange is
/// sent back with the next request. A new client starts with an empty history.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    system_instruction: String,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiClient {
    /// Creates a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a new client with a custom base URL.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// A client using `api_key` that continues this client's chat.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..self.clone()
        }
    }

    /// Completed turns of this client's chat, oldest first.
    pub async fn history(&self) -> Vec<Content> {
        self.history.lock().await.clone()
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    /// Sends `query` and streams the reply.
    ///
    /// The request is issued on first poll. When the stream completes without
    /// error, the query and the full reply are appended to the history.
    #[instrument(skip(self, query, options), fields(model = %options.model, tool = ?options.tool))]
    pub fn stream(
        &self,
        query: &str,
        options: &StreamOptions,
    ) -> impl Stream<Item = Result<StreamChunk, GeminiError>> + Send + 'static + use<> {
        let client = self.clone();
        let turn = Content::user(query);
        let options = options.clone();

        let request = async move {
            let body = {
                let history = client.history.lock().await;
                build_request_body(&history, &turn, &options, &client.system_instruction)
            };

            debug!("Sending request to Gemini");

            let response = client
                .http
                .post(client.endpoint(&options.model))
                .header("x-goog-api-key", &client.api_key)
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await?;
                let body: serde_json::Value =
                    serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
                return Err(parse_error(&body, status.as_u16()).unwrap_or(GeminiError::Api {
                    status: status.as_u16(),
                    message: text,
                }));
            }

            debug!("Receiving streamed response");

            Ok(record_turn(
                decode_chunks(response.bytes_stream()),
                client.history,
                turn,
            ))
        };

        stream::once(request).try_flatten()
    }
}

struct TurnState<S> {
    inner: S,
    reply: String,
    history: Arc<Mutex<Vec<Content>>>,
    turn: Content,
}

/// Appends the exchange to `history` once `chunks` ends cleanly.
fn record_turn<S>(
    chunks: S,
    history: Arc<Mutex<Vec<Content>>>,
    turn: Content,
) -> impl Stream<Item = Result<StreamChunk, GeminiError>> + Send + 'static
where
    S: Stream<Item = Result<StreamChunk, GeminiError>> + Send + 'static,
{
    let state = TurnState {
        inner: Box::pin(chunks),
        reply: String::new(),
        history,
        turn,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        match state.inner.next().await {
            Some(Ok(chunk)) => {
                if let Some(text) = &chunk.text {
                    state.reply.push_str(text);
                }
                Some((Ok(chunk), Some(state)))
            }
            Some(Err(e)) => Some((Err(e), None)),
            None => {
                let mut history = state.history.lock().await;
                history.push(state.turn);
                history.push(Content::model(state.reply));
                None
            }
        }
    })
}

impl ChatBackend for GeminiClient {
    fn send_message_stream(&self, query: &str, options: &StreamOptions) -> ChunkStream {
        self.stream(query, options)
            .map_err(|e| ChatError::new(e.to_string()))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon_core::Tool;

    #[test]
    fn test_client_creation() {
        let client = GeminiClient::new("test-key");
        assert_eq!(client.api_key, "test-key");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
        assert_eq!(client.system_instruction, DEFAULT_SYSTEM_INSTRUCTION);
    }

    #[test]
    fn test_client_custom_base_url() {
        let client = GeminiClient::with_base_url("test-key", "https://custom.api.com")
            .with_system_instruction("terse");
        assert_eq!(client.base_url, "https://custom.api.com");
        assert_eq!(client.system_instruction, "terse");
        assert_eq!(
            client.endpoint("gemini-2.5-flash"),
            "https://custom.api.com/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn rekeyed_client_continues_chat() {
        let client = GeminiClient::new("old-key").with_system_instruction("terse");
        client
            .history
            .lock()
            .await
            .extend([Content::user("hi"), Content::model("Hello")]);

        let rekeyed = client.with_api_key("new-key");
        assert_eq!(rekeyed.api_key, "new-key");
        assert_eq!(rekeyed.system_instruction, "terse");

        let options = StreamOptions {
            model: "gemini-3-flash-preview".to_string(),
            tool: Tool::None,
            tool_context: None,
        };
        let body = build_request_body(
            &rekeyed.history().await,
            &Content::user("again"),
            &options,
            &rekeyed.system_instruction,
        );
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);

        // Both handles see turns recorded by either.
        rekeyed.history.lock().await.push(Content::user("more"));
        assert_eq!(client.history().await.len(), 3);
    }

    #[tokio::test]
    async fn completed_stream_extends_history() {
        let history = Arc::new(Mutex::new(vec![]));
        let chunks = stream::iter(vec![
            Ok(StreamChunk::text("Hel")),
            Ok(StreamChunk::default()),
            Ok(StreamChunk::text("lo")),
        ]);

        let items: Vec<_> = record_turn(chunks, Arc::clone(&history), Content::user("hi"))
            .collect()
            .await;
        assert_eq!(items.len(), 3);
        assert_eq!(
            *history.lock().await,
            vec![Content::user("hi"), Content::model("Hello")]
        );
    }

    #[tokio::test]
    async fn failed_stream_leaves_history_alone() {
        let history = Arc::new(Mutex::new(vec![]));
        let chunks = stream::iter(vec![
            Ok(StreamChunk::text("Hel")),
            Err(GeminiError::Api {
                status: 500,
                message: "boom".to_string(),
            }),
            Ok(StreamChunk::text("never")),
        ]);

        let items: Vec<_> = record_turn(chunks, Arc::clone(&history), Content::user("hi"))
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(history.lock().await.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires GEMINI_API_KEY env var"]
    async fn test_live_api() {
        let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY not set");
        let client = GeminiClient::new(api_key);
        let options = StreamOptions {
            model: "gemini-2.5-flash".to_string(),
            tool: Tool::None,
            tool_context: None,
        };

        let chunks: Vec<_> = client
            .send_message_stream("Say 'hello' and nothing else.", &options)
            .collect()
            .await;
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.is_ok()));

        let text: String = chunks
            .into_iter()
            .filter_map(|c| c.ok().and_then(|c| c.text))
            .collect();
        assert!(text.to_lowercase().contains("hello"));
        assert_eq!(client.history().await.len(), 2);
    }
}
