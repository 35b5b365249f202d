use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::StreamChunk;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Auxiliary retrieval capability the hosted service may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    None,
    Search,
    Places,
}

/// Per-request configuration for the chat backend.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOptions {
    pub model: String,
    pub tool: Tool,
    /// Location bound to the places tool; absent when unknown.
    pub tool_context: Option<GeoPoint>,
}

/// A failure reported by the chat backend.
///
/// Only the description is meaningful to the session, which classifies
/// failures by their text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ChatError {
    message: String,
}

impl ChatError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lazy sequence of response chunks for one query.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ChatError>>;

/// A hosted chat service.
pub trait ChatBackend: Send + Sync {
    /// Starts streaming the reply to `query`.
    ///
    /// Nothing is sent until the stream is first polled; transport and API
    /// failures surface as `Err` items.
    fn send_message_stream(&self, query: &str, options: &StreamOptions) -> ChunkStream;
}

/// Builds chat backends from the current credentials.
pub trait BackendFactory {
    type Backend: ChatBackend;

    fn connect(&self) -> Result<Self::Backend, ChatError>;

    /// Rebuilds `current` from fresh credentials, keeping its chat state.
    ///
    /// Defaults to a full [`connect`](BackendFactory::connect).
    fn refresh(&self, current: &Self::Backend) -> Result<Self::Backend, ChatError> {
        let _ = current;
        self.connect()
    }
}
