//! Chat conversation state for a streaming generative-AI client.
//!
//! A [`ChatSession`] owns the [`Conversation`] and a [`ChatBackend`]. Each
//! submitted query appends a user message, then the backend's chunk stream is
//! folded into a single in-progress assistant reply that is finalized under a
//! permanent [`MessageId`] when the stream ends.
//!
//! # Example
//!
//! ```ignore
//! use argon_core::{ChatSession, SessionConfig};
//!
//! let mut session = ChatSession::new(factory, SessionConfig::default());
//! session.submit_query("weather in Paris").await?;
//!
//! for message in session.conversation().messages() {
//!     println!("{:?}: {}", message.sender, message.text);
//! }
//! ```

mod backend;
mod classifier;
mod context;
mod conversation;
mod failure;
mod message;
mod session;

pub use backend::{BackendFactory, ChatBackend, ChatError, ChunkStream, GeoPoint, StreamOptions, Tool};
pub use classifier::{ModelTable, QueryPlan, RetrievalMode, classify};
pub use context::contextualize;
pub use conversation::Conversation;
pub use failure::FailureClass;
pub use message::{ActiveReply, Message, MessageId, MessageKind, Sender, StreamChunk};
pub use session::{
    ChatSession, Dispatch, Outcome, RefreshPolicy, SessionConfig, SessionError, StreamEvent, next_event,
};
