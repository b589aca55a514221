//! Interactive terminal chat
//!
//! Sidebar of conversations, transcript of the selected one, and an input
//! line. The loop drains reconciler events into the store before each frame,
//! so rendering only ever sees fully applied updates.

use anyhow::Result;
use chatbot_client::sign_out;
use chatbot_core::stream::StreamState;
use chatbot_core::{ChatController, Conversation, Role, SessionStore};
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{backend::CrosstermBackend, Frame, Terminal};
use std::io;
use std::time::Duration;
use tracing::{info, warn};

const SIDEBAR_WIDTH: u16 = 28;
const HELP_TEXT: &str = "/new /next /prev /select <n> /logout /quit | Tab switches chats";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    New,
    Next,
    Prev,
    /// 1-based sidebar position
    Select(usize),
    Logout,
    Quit,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Message(String),
    Command(SlashCommand),
    Invalid(String),
}

/// Interpret a submitted input line; blank input yields `None`
pub fn parse_input(line: &str) -> Option<UserInput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('/') {
        return Some(UserInput::Message(trimmed.to_string()));
    }

    let mut parts = trimmed.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    let command = match (name, arg) {
        ("/new", None) => SlashCommand::New,
        ("/next", None) => SlashCommand::Next,
        ("/prev", None) => SlashCommand::Prev,
        ("/logout", None) => SlashCommand::Logout,
        ("/quit" | "/exit", None) => SlashCommand::Quit,
        ("/help", None) => SlashCommand::Help,
        ("/select", Some(n)) => match n.parse::<usize>() {
            Ok(n) if n > 0 => SlashCommand::Select(n),
            _ => return Some(UserInput::Invalid(format!("Invalid conversation number: {}", n))),
        },
        ("/select", None) => return Some(UserInput::Invalid("Usage: /select <n>".to_string())),
        _ => return Some(UserInput::Invalid(format!("Unknown command: {}", trimmed))),
    };
    Some(UserInput::Command(command))
}

pub struct TuiApp<'a> {
    controller: ChatController,
    session: &'a mut SessionStore,
    input: String,
    notice: Option<String>,
    /// Lines scrolled up from the bottom of the transcript
    scroll_back: u16,
    should_quit: bool,
    logged_out: bool,
}

impl<'a> TuiApp<'a> {
    pub fn new(controller: ChatController, session: &'a mut SessionStore) -> Self {
        Self {
            controller,
            session,
            input: String::new(),
            notice: None,
            scroll_back: 0,
            should_quit: false,
            logged_out: false,
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.should_quit = true;
            }
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab => self.switch(true),
            KeyCode::BackTab => self.switch(false),
            KeyCode::Up => self.scroll_back = self.scroll_back.saturating_add(1),
            KeyCode::PageUp => self.scroll_back = self.scroll_back.saturating_add(10),
            KeyCode::Down => self.scroll_back = self.scroll_back.saturating_sub(1),
            KeyCode::PageDown => self.scroll_back = self.scroll_back.saturating_sub(10),
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(ch) => self.input.push(ch),
            _ => {}
        }
    }

    pub fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);
        match parse_input(&line) {
            None => {}
            Some(UserInput::Message(text)) => match self.controller.send(text) {
                Ok(target) => {
                    info!(conversation = %target.conversation_id, "Message sent");
                    self.notice = None;
                    self.scroll_back = 0;
                }
                Err(e) => {
                    warn!("Send failed: {}", e);
                    self.notice = Some(e.to_string());
                }
            },
            Some(UserInput::Command(command)) => self.run_command(command),
            Some(UserInput::Invalid(message)) => self.notice = Some(message),
        }
    }

    fn run_command(&mut self, command: SlashCommand) {
        self.notice = None;
        match command {
            SlashCommand::New => {
                self.controller.store_mut().create_conversation();
                self.scroll_back = 0;
            }
            SlashCommand::Next => self.switch(true),
            SlashCommand::Prev => self.switch(false),
            SlashCommand::Select(n) => {
                if self.controller.store_mut().select_index(n - 1) {
                    self.scroll_back = 0;
                } else {
                    self.notice = Some(format!("No conversation #{}", n));
                }
            }
            SlashCommand::Logout => {
                if let Err(e) = sign_out(self.session) {
                    warn!("Failed to clear session: {}", e);
                    self.notice = Some(format!("Logout failed: {}", e));
                    return;
                }
                self.controller.logout();
                self.logged_out = true;
                self.should_quit = true;
            }
            SlashCommand::Quit => self.should_quit = true,
            SlashCommand::Help => self.notice = Some(HELP_TEXT.to_string()),
        }
    }

    fn switch(&mut self, forward: bool) {
        self.controller.store_mut().cycle_selection(forward);
        self.scroll_back = 0;
    }

    pub fn render(&self, frame: &mut Frame) {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
            .split(frame.area());
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(3),
            ])
            .split(columns[1]);

        let store = self.controller.store();

        let items: Vec<ListItem> = store
            .conversations()
            .iter()
            .enumerate()
            .map(|(i, conversation)| {
                let marker = if conversation.is_streaming() { "* " } else { "" };
                ListItem::new(format!("{}. {}{}", i + 1, marker, conversation.title))
            })
            .collect();
        let sidebar = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("chats"))
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");
        let mut list_state = ListState::default().with_selected(store.selected_index());
        frame.render_stateful_widget(sidebar, columns[0], &mut list_state);

        let status = if store.any_streaming() { "streaming" } else { "idle" };
        let status_line = match &self.notice {
            Some(notice) => notice.clone(),
            None => format!(
                "transport: {} | chats: {} | status: {}",
                self.controller.transport_name(),
                store.len(),
                status
            ),
        };
        frame.render_widget(
            Paragraph::new(status_line)
                .block(Block::default().borders(Borders::ALL).title("chatbot")),
            rows[0],
        );

        let (title, lines) = match store.active() {
            Some(conversation) => (transcript_title(conversation), transcript_lines(conversation)),
            None => (
                "no conversation".to_string(),
                vec![Line::from("Type a message to start a new chat.")],
            ),
        };
        let inner_width = rows[1].width.saturating_sub(2);
        let inner_height = rows[1].height.saturating_sub(2);
        let total = wrapped_height(&lines, inner_width);
        let scroll = total
            .saturating_sub(inner_height)
            .saturating_sub(self.scroll_back);
        frame.render_widget(
            Paragraph::new(lines)
                .block(Block::default().borders(Borders::ALL).title(title))
                .wrap(Wrap { trim: false })
                .scroll((scroll, 0)),
            rows[1],
        );

        frame.render_widget(
            Paragraph::new(self.input.clone()).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("message (Enter send, /help)"),
            ),
            rows[2],
        );
        let typed = u16::try_from(self.input.chars().count()).unwrap_or(u16::MAX);
        let cursor_x = rows[2]
            .x
            .saturating_add(1)
            .saturating_add(typed)
            .min(rows[2].right().saturating_sub(2));
        frame.set_cursor_position((cursor_x, rows[2].y.saturating_add(1)));
    }
}

fn transcript_title(conversation: &Conversation) -> String {
    format!(
        "{} (started {})",
        conversation.title,
        conversation.created_at.format("%Y-%m-%d %H:%M UTC")
    )
}

fn transcript_lines(conversation: &Conversation) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let last = conversation.messages.len().saturating_sub(1);
    // No fragment has arrived yet for the trailing reply
    let waiting = matches!(
        conversation.stream(),
        StreamState::Streaming(active) if !active.has_received()
    );
    for (i, message) in conversation.messages.iter().enumerate() {
        let (label, color) = match message.role {
            Role::User => ("you", Color::Cyan),
            Role::Assistant => ("assistant", Color::Green),
        };
        let content = if message.content.is_empty() && i == last && waiting {
            "...".to_string()
        } else {
            message.content.clone()
        };

        let mut body = content.split('\n');
        let first = body.next().unwrap_or_default().to_string();
        lines.push(Line::from(vec![
            Span::styled(format!("[{}] ", label), Style::default().fg(color)),
            Span::raw(first),
        ]));
        for rest in body {
            lines.push(Line::from(rest.to_string()));
        }
        lines.push(Line::from(""));
    }
    lines
}

/// Rows `lines` occupy when wrapped to `width` columns
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = usize::from(width.max(1));
    let rows: usize = lines
        .iter()
        .map(|line| line.width().div_ceil(width).max(1))
        .sum();
    u16::try_from(rows).unwrap_or(u16::MAX)
}

/// Run the interactive chat until the user quits; returns whether they
/// logged out
pub fn run_tui(controller: ChatController, session: &mut SessionStore) -> Result<bool> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = TuiApp::new(controller, session);
    let result = event_loop(&mut terminal, &mut app);

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.controller.shutdown();
    result.map(|()| app.logged_out)
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp<'_>,
) -> Result<()> {
    loop {
        app.controller.pump();

        terminal.draw(|frame| app.render(frame))?;

        if event::poll(Duration::from_millis(60))? {
            if let CEvent::Key(key) = event::read()? {
                app.on_key(key);
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatbot_core::{
        ChatTransport, CompletionRequest, FlushPolicy, TransportEvent, TransportStream,
    };
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use ratatui::backend::TestBackend;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct EchoTransport;

    #[async_trait]
    impl ChatTransport for EchoTransport {
        async fn open(&self, request: CompletionRequest) -> chatbot_core::Result<TransportStream> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(vec![
                TransportEvent::Fragment(format!("echo: {}", last)),
                TransportEvent::Ended,
            ])))
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    /// Yields its fragments, then never ends
    struct StalledTransport(&'static [&'static str]);

    #[async_trait]
    impl ChatTransport for StalledTransport {
        async fn open(&self, _request: CompletionRequest) -> chatbot_core::Result<TransportStream> {
            let events: Vec<TransportEvent> = self
                .0
                .iter()
                .map(|f| TransportEvent::Fragment(f.to_string()))
                .collect();
            Ok(Box::pin(
                futures::stream::iter(events).chain(futures::stream::pending()),
            ))
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    fn plain(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    fn controller() -> ChatController {
        let mut controller = ChatController::new(Arc::new(EchoTransport), FlushPolicy::EveryFragment);
        controller.set_credential(Some("tok".to_string()));
        controller
    }

    fn type_line(app: &mut TuiApp<'_>, text: &str) {
        for ch in text.chars() {
            app.on_key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::NONE));
        }
        app.on_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("   "), None);
        assert_eq!(
            parse_input(" hello there "),
            Some(UserInput::Message("hello there".to_string()))
        );
        assert_eq!(parse_input("/new"), Some(UserInput::Command(SlashCommand::New)));
        assert_eq!(
            parse_input("/select 3"),
            Some(UserInput::Command(SlashCommand::Select(3)))
        );
        assert!(matches!(parse_input("/select 0"), Some(UserInput::Invalid(_))));
        assert!(matches!(parse_input("/select"), Some(UserInput::Invalid(_))));
        assert!(matches!(parse_input("/frobnicate"), Some(UserInput::Invalid(_))));
        assert_eq!(parse_input("/quit"), Some(UserInput::Command(SlashCommand::Quit)));
    }

    #[tokio::test]
    async fn test_typed_message_gets_reply() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = SessionStore::open(temp_dir.path()).unwrap();
        let mut app = TuiApp::new(controller(), &mut session);

        type_line(&mut app, "hi");
        assert!(app.input.is_empty());

        let id = app.controller.store().selected_id().cloned().unwrap();
        app.controller.wait_until_idle(&id).await;

        let conversation = app.controller.store().active().unwrap();
        assert_eq!(conversation.title, "AI Assistant Introduces Itself Briefly");
        assert_eq!(conversation.last_message().unwrap().content, "echo: hi");
    }

    #[tokio::test]
    async fn test_new_select_and_cycle() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = SessionStore::open(temp_dir.path()).unwrap();
        let mut app = TuiApp::new(controller(), &mut session);

        type_line(&mut app, "/new");
        type_line(&mut app, "/new");
        assert_eq!(app.controller.store().len(), 3);
        assert_eq!(app.controller.store().selected_index(), Some(2));

        app.on_key(KeyEvent::new(KeyCode::Tab, KeyModifiers::NONE));
        assert_eq!(app.controller.store().selected_index(), Some(0));

        type_line(&mut app, "/prev");
        assert_eq!(app.controller.store().selected_index(), Some(2));

        type_line(&mut app, "/select 2");
        assert_eq!(app.controller.store().selected_index(), Some(1));

        type_line(&mut app, "/select 9");
        assert_eq!(app.controller.store().selected_index(), Some(1));
        assert_eq!(app.notice.as_deref(), Some("No conversation #9"));
    }

    #[tokio::test]
    async fn test_logout_clears_session_and_quits() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = SessionStore::open(temp_dir.path()).unwrap();
        session.set_token("tok").unwrap();

        {
            let mut app = TuiApp::new(controller(), &mut session);
            type_line(&mut app, "/new");
            type_line(&mut app, "/logout");

            assert!(app.should_quit);
            assert!(app.logged_out);
            assert!(!app.controller.is_authenticated());
            assert_eq!(app.controller.store().len(), 1);
        }

        assert!(!session.is_authenticated());
        assert!(!SessionStore::open(temp_dir.path()).unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_render_shows_greeting_and_sidebar() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = SessionStore::open(temp_dir.path()).unwrap();
        let app = TuiApp::new(controller(), &mut session);

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal.draw(|frame| app.render(frame)).unwrap();

        let buffer = terminal.backend().buffer();
        let area = buffer.area;
        let screen: String = (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buffer[(x, y)].symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n");

        assert!(screen.contains("Hello! How can I help you today?"));
        assert!(screen.contains("> 1. AI Assistant"));
        assert!(screen.contains("transport: echo"));
    }

    #[tokio::test]
    async fn test_cursor_stays_inside_input_box() {
        let temp_dir = TempDir::new().unwrap();
        let mut session = SessionStore::open(temp_dir.path()).unwrap();
        let mut app = TuiApp::new(controller(), &mut session);
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();

        app.input = "hi".to_string();
        terminal.draw(|frame| app.render(frame)).unwrap();
        assert_eq!(
            terminal.get_cursor_position().unwrap().x,
            SIDEBAR_WIDTH + 1 + 2
        );

        app.input = "x".repeat(usize::from(u16::MAX) + 10);
        terminal.draw(|frame| app.render(frame)).unwrap();
        assert_eq!(terminal.get_cursor_position().unwrap().x, 98);
    }

    #[tokio::test]
    async fn test_placeholder_shows_ellipsis_until_first_fragment() {
        let mut controller =
            ChatController::new(Arc::new(StalledTransport(&["Hel"])), FlushPolicy::WordBoundary);
        let target = controller.send("hi").unwrap();

        let conversation = controller.store().get(&target.conversation_id).unwrap();
        let lines = plain(&transcript_lines(conversation));
        assert!(lines.contains(&"[assistant] ...".to_string()));

        let (_, outcome) = controller.next_event().await.unwrap();
        assert_eq!(outcome, chatbot_core::conversation::ApplyOutcome::Applied);
        let conversation = controller.store().get(&target.conversation_id).unwrap();
        assert!(conversation.is_streaming());
        let lines = plain(&transcript_lines(conversation));
        assert!(!lines.iter().any(|line| line.ends_with("...")));
    }

    #[test]
    fn test_transcript_title_shows_start_time() {
        let mut conversation = Conversation::new();
        conversation.created_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        assert_eq!(
            transcript_title(&conversation),
            "New Chat (started 2024-05-01 09:30 UTC)"
        );
    }

    #[test]
    fn test_wrapped_height() {
        let lines = vec![Line::from("abcdefghij"), Line::from(""), Line::from("abc")];
        assert_eq!(wrapped_height(&lines, 4), 3 + 1 + 1);
        assert_eq!(wrapped_height(&lines, 0), 10 + 1 + 3);
    }
}
