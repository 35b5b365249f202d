use argon_core::{
    BackendFactory, ChatError, ChatSession, ChunkStream, Dispatch, GeoPoint, SessionError,
    StreamEvent, next_event,
};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Chat,
    Streaming,
}

pub struct ChatApp<F: BackendFactory> {
    pub mode: AppMode,
    pub should_quit: bool,
    pub session: ChatSession<F>,
    pub input: String,
    pub cursor_pos: usize,
    pub messages_scroll: u16,
    pub events_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    pub location_rx: Option<oneshot::Receiver<Option<GeoPoint>>>,
    pub notice: Option<String>,
}

/// Pumps `stream` on its own task so the event loop never blocks on the network.
///
/// Every stream ends with exactly one `Finished` or `Failed` event unless the
/// receiver is dropped first.
fn forward(mut stream: ChunkStream) -> mpsc::UnboundedReceiver<StreamEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let event = next_event(&mut stream).await;
            let last = !matches!(event, StreamEvent::Chunk(_));
            if tx.send(event).is_err() || last {
                break;
            }
        }
    });
    rx
}

impl<F: BackendFactory> ChatApp<F> {
    pub fn new(
        session: ChatSession<F>,
        location_rx: Option<oneshot::Receiver<Option<GeoPoint>>>,
    ) -> Self {
        Self {
            mode: AppMode::Chat,
            should_quit: false,
            session,
            input: String::new(),
            cursor_pos: 0,
            messages_scroll: 0,
            events_rx: None,
            location_rx,
            notice: None,
        }
    }

    pub fn send_message(&mut self) {
        match self.session.start_query(&self.input) {
            Ok(Dispatch::Ignored) => {}
            Ok(Dispatch::Unavailable(_)) => {
                self.clear_input();
            }
            Ok(Dispatch::Streaming(stream)) => {
                self.clear_input();
                self.events_rx = Some(forward(stream));
                self.mode = AppMode::Streaming;
                self.messages_scroll = 0;
                self.notice = None;
            }
            Err(SessionError::Busy) => {
                self.notice = Some("Still answering the previous message".to_string());
            }
        }
    }

    /// Applies every stream event received since the last tick.
    pub fn poll_response(&mut self) {
        let Some(rx) = self.events_rx.as_mut() else {
            return;
        };

        loop {
            let event = match rx.try_recv() {
                Ok(event) => event,
                Err(mpsc::error::TryRecvError::Empty) => return,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    warn!("Response task ended without a final event");
                    StreamEvent::Failed(ChatError::new("response stream closed unexpectedly"))
                }
            };

            if self.session.apply_event(event).is_some() {
                self.events_rx = None;
                self.mode = AppMode::Chat;
                self.messages_scroll = 0; // Scroll to bottom
                return;
            }
        }
    }

    pub fn poll_location(&mut self) {
        if let Some(ref mut rx) = self.location_rx {
            match rx.try_recv() {
                Ok(point) => {
                    self.session.set_location(point);
                    self.location_rx = None;
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    // Still looking
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    self.location_rx = None;
                }
            }
        }
    }

    fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_pos = 0;
    }

    pub fn scroll_up(&mut self) {
        self.messages_scroll = self.messages_scroll.saturating_add(1);
    }

    pub fn scroll_down(&mut self) {
        self.messages_scroll = self.messages_scroll.saturating_sub(1);
    }

    pub fn input_char(&mut self, c: char) {
        self.input.insert(self.cursor_pos, c);
        self.cursor_pos += c.len_utf8();
    }

    pub fn input_backspace(&mut self) {
        if self.cursor_pos > 0 {
            let prev_char_boundary = self.input[..self.cursor_pos]
                .char_indices()
                .next_back()
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.input.remove(prev_char_boundary);
            self.cursor_pos = prev_char_boundary;
        }
    }

    pub fn input_delete(&mut self) {
        if self.cursor_pos < self.input.len() {
            self.input.remove(self.cursor_pos);
        }
    }

    pub fn input_left(&mut self) {
        if self.cursor_pos > 0 {
            self.cursor_pos = self.input[..self.cursor_pos]
                .char_indices()
                .next_back()
                .map(|(i, _)| i)
                .unwrap_or(0);
        }
    }

    pub fn input_right(&mut self) {
        if self.cursor_pos < self.input.len() {
            self.cursor_pos = self.input[self.cursor_pos..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| self.cursor_pos + i)
                .unwrap_or(self.input.len());
        }
    }

    pub fn input_home(&mut self) {
        self.cursor_pos = 0;
    }

    pub fn input_end(&mut self) {
        self.cursor_pos = self.input.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon_core::{ChatBackend, MessageKind, SessionConfig, StreamChunk, StreamOptions};
    use futures::StreamExt;
    use futures::stream;
    use std::time::Duration;

    struct Slow;

    impl ChatBackend for Slow {
        fn send_message_stream(&self, _query: &str, _options: &StreamOptions) -> ChunkStream {
            stream::iter(vec![
                Ok(StreamChunk::text("one ")),
                Ok(StreamChunk::text("two").with_citations(["https://a"])),
            ])
            .then(|item| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                item
            })
            .boxed()
        }
    }

    struct SlowFactory;

    impl BackendFactory for SlowFactory {
        type Backend = Slow;

        fn connect(&self) -> Result<Slow, ChatError> {
            Ok(Slow)
        }
    }

    fn app() -> ChatApp<SlowFactory> {
        ChatApp::new(ChatSession::new(SlowFactory, SessionConfig::default()), None)
    }

    fn type_text(app: &mut ChatApp<SlowFactory>, text: &str) {
        for c in text.chars() {
            app.input_char(c);
        }
    }

    async fn drain(app: &mut ChatApp<SlowFactory>) {
        while app.mode == AppMode::Streaming {
            tokio::time::sleep(Duration::from_millis(1)).await;
            app.poll_response();
        }
    }

    #[tokio::test]
    async fn streamed_reply_lands_in_conversation() {
        let mut app = app();
        type_text(&mut app, "hello");
        app.send_message();
        assert_eq!(app.mode, AppMode::Streaming);
        assert!(app.input.is_empty());

        drain(&mut app).await;

        let messages = app.session.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "one two");
        assert_eq!(messages[1].kind, MessageKind::Grounded);
        assert!(!app.session.is_busy());
    }

    #[tokio::test]
    async fn enter_while_streaming_is_rejected() {
        let mut app = app();
        type_text(&mut app, "first");
        app.send_message();
        type_text(&mut app, "second");
        app.send_message();

        assert!(app.notice.is_some());
        assert_eq!(app.input, "second");

        drain(&mut app).await;
        assert_eq!(app.session.conversation().messages().len(), 2);
    }

    #[tokio::test]
    async fn blank_input_does_nothing() {
        let mut app = app();
        type_text(&mut app, "   ");
        app.send_message();
        assert_eq!(app.mode, AppMode::Chat);
        assert!(app.session.conversation().is_empty());
    }

    #[tokio::test]
    async fn dropped_task_releases_busy_state() {
        let mut app = app();
        type_text(&mut app, "hi");
        app.send_message();

        // Replace the live channel with one whose sender is already gone.
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);
        app.events_rx = Some(rx);
        app.poll_response();

        assert_eq!(app.mode, AppMode::Chat);
        assert!(!app.session.is_busy());
        let last = app.session.conversation().messages().last().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
    }

    #[tokio::test]
    async fn location_arrives_later() {
        let (tx, rx) = oneshot::channel();
        let mut app = ChatApp::new(
            ChatSession::new(SlowFactory, SessionConfig::default()),
            Some(rx),
        );
        app.poll_location();
        assert!(app.location_rx.is_some());

        let point = GeoPoint {
            latitude: 1.0,
            longitude: 2.0,
        };
        tx.send(Some(point)).unwrap();
        app.poll_location();
        assert_eq!(app.session.location(), Some(point));
        assert!(app.location_rx.is_none());
    }

    #[test]
    fn cursor_moves_over_multibyte_chars() {
        let mut app = app();
        type_text(&mut app, "aé");
        app.input_left();
        assert_eq!(app.cursor_pos, 1);
        app.input_backspace();
        assert_eq!(app.input, "é");
        app.input_end();
        assert_eq!(app.cursor_pos, 2);
    }
}
