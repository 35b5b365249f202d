use argon_core::BackendFactory;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};

use super::app::ChatApp;

pub fn handle_event<F: BackendFactory>(app: &mut ChatApp<F>, event: Event) {
    if let Event::Key(key) = event {
        handle_key(app, key);
    }
}

/// Editing stays live while a reply streams; only sending is gated.
fn handle_key<F: BackendFactory>(app: &mut ChatApp<F>, key: KeyEvent) {
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
            app.should_quit = true;
        }
        (KeyCode::Enter, KeyModifiers::NONE) => {
            app.send_message();
        }
        (KeyCode::Enter, KeyModifiers::SHIFT) => {
            app.input_char('\n');
        }
        (KeyCode::Up, KeyModifiers::CONTROL) => {
            app.scroll_up();
        }
        (KeyCode::Down, KeyModifiers::CONTROL) => {
            app.scroll_down();
        }
        (KeyCode::Backspace, _) => {
            app.input_backspace();
        }
        (KeyCode::Delete, _) => {
            app.input_delete();
        }
        (KeyCode::Left, _) => {
            app.input_left();
        }
        (KeyCode::Right, _) => {
            app.input_right();
        }
        (KeyCode::Home, _) => {
            app.input_home();
        }
        (KeyCode::End, _) => {
            app.input_end();
        }
        (KeyCode::Char(c), KeyModifiers::NONE | KeyModifiers::SHIFT) => {
            app.input_char(c);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon_core::{
        ChatBackend, ChatError, ChatSession, ChunkStream, SessionConfig, StreamOptions,
    };
    use futures::StreamExt;
    use futures::stream;

    struct Silent;

    impl ChatBackend for Silent {
        fn send_message_stream(&self, _query: &str, _options: &StreamOptions) -> ChunkStream {
            stream::empty().boxed()
        }
    }

    struct SilentFactory;

    impl BackendFactory for SilentFactory {
        type Backend = Silent;

        fn connect(&self) -> Result<Silent, ChatError> {
            Ok(Silent)
        }
    }

    fn press(app: &mut ChatApp<SilentFactory>, code: KeyCode, modifiers: KeyModifiers) {
        handle_event(app, Event::Key(KeyEvent::new(code, modifiers)));
    }

    #[tokio::test]
    async fn shift_enter_inserts_newline() {
        let mut app = ChatApp::new(ChatSession::new(SilentFactory, SessionConfig::default()), None);
        press(&mut app, KeyCode::Char('a'), KeyModifiers::NONE);
        press(&mut app, KeyCode::Enter, KeyModifiers::SHIFT);
        press(&mut app, KeyCode::Char('B'), KeyModifiers::SHIFT);

        assert_eq!(app.input, "a\nB");
        assert!(app.session.conversation().is_empty());

        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert!(app.input.is_empty());
        assert_eq!(app.session.conversation().messages()[0].text, "a\nB");
    }

    #[tokio::test]
    async fn escape_quits() {
        let mut app = ChatApp::new(ChatSession::new(SilentFactory, SessionConfig::default()), None);
        press(&mut app, KeyCode::Esc, KeyModifiers::NONE);
        assert!(app.should_quit);
    }
}
