use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Permanent identifier of a finalized message.
///
/// Allocated by [`Conversation`](crate::Conversation) from a counter that never
/// repeats within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    PlainText,
    /// Carries at least one citation URL.
    Grounded,
    /// A failure notice.
    Error,
}

/// A finalized, immutable entry of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub kind: MessageKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub citations: IndexSet<String>,
}

impl Message {
    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

/// The assistant reply currently being streamed.
///
/// Lives in the conversation's in-progress slot until the stream ends; it has
/// no identifier until it is finalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveReply {
    pub text: String,
    pub citations: IndexSet<String>,
}

impl ActiveReply {
    /// Grounding is monotonic: the citation set only ever grows.
    pub fn kind(&self) -> MessageKind {
        if self.citations.is_empty() {
            MessageKind::PlainText
        } else {
            MessageKind::Grounded
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.citations.is_empty()
    }

    /// Returns the reply with `chunk` folded in.
    pub fn merged(mut self, chunk: &StreamChunk) -> Self {
        if let Some(fragment) = &chunk.text {
            self.text.push_str(fragment);
        }
        self.citations.extend(chunk.citations.iter().cloned());
        self
    }

    pub(crate) fn finalize(self, id: MessageId) -> Message {
        let kind = self.kind();
        Message {
            id,
            sender: Sender::Assistant,
            kind,
            text: self.text,
            citations: self.citations,
        }
    }
}

/// One incremental unit of a streamed response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    /// Appended to the reply text, never replacing it.
    pub text: Option<String>,
    /// Newly reported citation URLs; unioned across the stream.
    pub citations: Vec<String>,
}

impl StreamChunk {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            text: Some(fragment.into()),
            citations: Vec::new(),
        }
    }

    pub fn with_citations<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.citations.extend(urls.into_iter().map(Into::into));
        self
    }
}
