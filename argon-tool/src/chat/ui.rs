use argon_core::{BackendFactory, Message, MessageKind, Sender};
use indexmap::IndexSet;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use super::app::{AppMode, ChatApp};

const MAX_INPUT_LINES: u16 = 4;

pub fn render<F: BackendFactory>(frame: &mut Frame, app: &ChatApp<F>) {
    let input_lines = (app.input.matches('\n').count() as u16 + 1).min(MAX_INPUT_LINES);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Min(1),    // Messages
            Constraint::Length(input_lines + 2), // Input
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_messages(frame, app, chunks[1]);
    render_input(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3]);
}

fn render_header<F: BackendFactory>(frame: &mut Frame, app: &ChatApp<F>, area: Rect) {
    let mode_text = match app.session.last_mode() {
        Some(mode) => format!(" [{}]", mode),
        None => String::new(),
    };

    let location_text = match app.session.location() {
        Some(point) => format!("  location: {:.2}, {:.2}", point.latitude, point.longitude),
        None if app.location_rx.is_some() => "  location: looking up...".to_string(),
        None => "  location: unknown".to_string(),
    };

    let title = format!("arg chat{}{}", mode_text, location_text);

    let header = Paragraph::new(title).style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));

    frame.render_widget(header, area);
}

fn push_body(lines: &mut Vec<Line<'static>>, text: &str, style: Style) {
    for line in text.lines() {
        lines.push(Line::from(Span::styled(format!("  {}", line), style)));
    }
}

fn push_citations(lines: &mut Vec<Line<'static>>, citations: &IndexSet<String>) {
    for (n, url) in citations.iter().enumerate() {
        lines.push(Line::from(Span::styled(
            format!("  [{}] {}", n + 1, url),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::UNDERLINED),
        )));
    }
}

fn message_lines(msg: &Message, lines: &mut Vec<Line<'static>>) {
    let (role, style) = match (msg.sender, msg.kind) {
        (_, MessageKind::Error) => ("Error", Style::default().fg(Color::Red)),
        (Sender::User, _) => ("You", Style::default().fg(Color::Green)),
        (Sender::Assistant, MessageKind::Grounded) => ("Assistant (grounded)", Style::default().fg(Color::Blue)),
        (Sender::Assistant, MessageKind::PlainText) => ("Assistant", Style::default().fg(Color::Blue)),
    };

    lines.push(Line::from(Span::styled(format!("{}:", role), style.add_modifier(Modifier::BOLD))));

    let body_style = if msg.is_error() { style } else { Style::default() };
    push_body(lines, &msg.text, body_style);
    push_citations(lines, &msg.citations);

    lines.push(Line::from("")); // Empty line between messages
}

fn render_messages<F: BackendFactory>(frame: &mut Frame, app: &ChatApp<F>, area: Rect) {
    let conversation = app.session.conversation();
    let mut lines: Vec<Line> = Vec::new();

    for msg in conversation.messages() {
        message_lines(msg, &mut lines);
    }

    // Reply still streaming in
    if let Some(active) = conversation.active() {
        lines.push(Line::from(Span::styled(
            "Assistant:",
            Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
        )));
        push_body(&mut lines, &active.text, Style::default());
        push_citations(&mut lines, &active.citations);
    } else if app.mode == AppMode::Streaming {
        lines.push(Line::from(Span::styled(
            "Waiting for response...",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        )));
    }

    if let Some(ref notice) = app.notice {
        lines.push(Line::from(Span::styled(
            notice.clone(),
            Style::default().fg(Color::Yellow),
        )));
    }

    let messages_block = Block::default().borders(Borders::ALL).title("Messages");

    // Calculate scroll offset to show the bottom of the conversation
    let visible_height = area.height.saturating_sub(2) as usize; // Account for borders
    let total_lines = lines.len();
    let scroll = if total_lines > visible_height {
        (total_lines - visible_height).saturating_sub(app.messages_scroll as usize)
    } else {
        0
    };

    let paragraph = Paragraph::new(Text::from(lines))
        .block(messages_block)
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0));

    frame.render_widget(paragraph, area);
}

fn render_input<F: BackendFactory>(frame: &mut Frame, app: &ChatApp<F>, area: Rect) {
    let input_block = Block::default().borders(Borders::ALL).title("Ask anything");

    let display_text = if app.input.is_empty() {
        "Type your question here...".to_string()
    } else {
        app.input.clone()
    };

    let style = if app.input.is_empty() {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default()
    };

    let input_paragraph = Paragraph::new(display_text)
        .style(style)
        .block(input_block);

    frame.render_widget(input_paragraph, area);

    let before = &app.input[..app.cursor_pos];
    let row = (before.matches('\n').count() as u16).min(MAX_INPUT_LINES - 1);
    let column = before.rsplit('\n').next().unwrap_or("").chars().count() as u16;
    frame.set_cursor_position((area.x + 1 + column, area.y + 1 + row));
}

fn render_status_bar<F: BackendFactory>(frame: &mut Frame, app: &ChatApp<F>, area: Rect) {
    let status = match app.mode {
        AppMode::Chat => "Enter: Send  Shift+Enter: Newline  Ctrl+↑/↓: Scroll  Esc: Quit",
        AppMode::Streaming => "Streaming response...  Ctrl+↑/↓: Scroll  Esc: Quit",
    };

    let status_bar = Paragraph::new(status).style(Style::default().fg(Color::DarkGray));

    frame.render_widget(status_bar, area);
}
