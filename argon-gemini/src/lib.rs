//! Gemini API client for the argon chat core.
//!
//! Streams replies from `streamGenerateContent` as server-sent events and turns
//! each response object into an [`argon_core::StreamChunk`], collecting web and
//! maps grounding links as citations.
//!
//! # Example
//!
//! ```ignore
//! use argon_core::{ChatSession, SessionConfig};
//! use argon_gemini::GeminiConnector;
//!
//! #[tokio::main]
//! async fn main() {
//!     let connector = GeminiConnector::with_key("your-api-key");
//!     let mut session = ChatSession::new(connector, SessionConfig::default());
//!
//!     session.submit_query("who won the match yesterday?").await.unwrap();
//! }
//! ```

mod client;
mod connector;
mod convert;
mod error;
mod sse;
mod types;

pub use client::{DEFAULT_SYSTEM_INSTRUCTION, GeminiClient};
pub use connector::{GeminiConnector, KeySource};
pub use convert::{build_request_body, parse_chunk};
pub use error::GeminiError;
pub use sse::{SseDecoder, decode_chunks};
pub use types::{Content, Role};
