use tracing::debug;

use crate::message::{ActiveReply, Message, MessageId, MessageKind, Sender, StreamChunk};

/// Ordered chat history plus the slot for the reply being streamed.
///
/// Finalized messages are append-only. The in-progress reply is kept apart
/// from them and only joins the list, under a freshly allocated id, once its
/// stream ends.
#[derive(Debug, Default)]
pub struct Conversation {
    finalized: Vec<Message>,
    active: Option<ActiveReply>,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalized messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.finalized
    }

    /// The reply currently being streamed, if any.
    pub fn active(&self) -> Option<&ActiveReply> {
        self.active.as_ref()
    }

    pub fn len(&self) -> usize {
        self.finalized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finalized.is_empty() && self.active.is_none()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.finalized.iter().find(|m| m.id == id)
    }

    fn allocate_id(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId::new(self.next_id)
    }

    fn push(&mut self, sender: Sender, kind: MessageKind, text: String) -> MessageId {
        let id = self.allocate_id();
        self.finalized.push(Message {
            id,
            sender,
            kind,
            text,
            citations: Default::default(),
        });
        id
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> MessageId {
        self.push(Sender::User, MessageKind::PlainText, text.into())
    }

    pub fn push_error(&mut self, text: impl Into<String>) -> MessageId {
        self.push(Sender::Assistant, MessageKind::Error, text.into())
    }

    /// Folds one chunk into the in-progress reply, opening it on first use.
    ///
    /// The reply is moved out of the slot, extended, and written back with a
    /// single assignment.
    pub fn apply_chunk(&mut self, chunk: &StreamChunk) {
        let next = match self.active.take() {
            Some(reply) => reply.merged(chunk),
            None => {
                debug!("Opening in-progress reply");
                ActiveReply::default().merged(chunk)
            }
        };
        self.active = Some(next);
    }

    /// Ends the stream normally, moving the reply into the finalized list.
    ///
    /// Returns `None` when the stream produced no chunks.
    pub fn finish_stream(&mut self) -> Option<MessageId> {
        let reply = self.active.take()?;
        let id = self.allocate_id();
        self.finalized.push(reply.finalize(id));
        Some(id)
    }

    /// Ends the stream after a failure.
    ///
    /// Partial output is kept as a finalized message; a placeholder that never
    /// received any text or citations is dropped.
    pub fn interrupt_stream(&mut self) -> Option<MessageId> {
        let reply = self.active.take()?;
        if reply.is_empty() {
            return None;
        }
        let id = self.allocate_id();
        self.finalized.push(reply.finalize(id));
        Some(id)
    }
}
