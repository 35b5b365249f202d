mod app;
mod input;
mod ui;

use std::io;
use std::time::Duration;

use argon_core::{BackendFactory, ChatSession, GeoPoint};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::prelude::*;
use tokio::sync::oneshot;

use app::ChatApp;
use crate::error::ArgError;

pub async fn run<F: BackendFactory>(
    session: ChatSession<F>,
    location_rx: Option<oneshot::Receiver<Option<GeoPoint>>>,
) -> Result<(), ArgError> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = ChatApp::new(session, location_rx);

    let result = run_loop(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

async fn run_loop<F: BackendFactory>(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut ChatApp<F>,
) -> Result<(), ArgError> {
    loop {
        terminal.draw(|f| ui::render(f, app))?;

        // Poll with a timeout so streamed chunks keep flowing in
        if event::poll(Duration::from_millis(50))? {
            let event = event::read()?;
            input::handle_event(app, event);
        }

        app.poll_response();
        app.poll_location();

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
