mod buffer;

use std::cell::{Cell, RefCell};
use std::io::{self, Stdout};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, KeyboardEnhancementFlags, MouseButton, MouseEvent, MouseEventKind,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, supports_keyboard_enhancement, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Margin, Position, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, Borders, Cell as TableCell, Clear, Paragraph, Row as TableRow, Table,
};
use ratatui::{Frame, Terminal};
use serde_json::Value;
use sqlpane_core::commands::{CommandSurface, Key, KeyChord, Modifiers, ShortcutParseError};
use sqlpane_core::config::EditorSettings;
use sqlpane_core::content_sync::SharedEditorText;
use sqlpane_core::dispatcher::{
    EngineFactory, Notification, NotificationLevel, NotificationSink, SharedResultStore,
};
use sqlpane_core::language::{CompletionItem, CompletionKind, Hover};
use sqlpane_core::providers::InMemoryLanguageHost;
use sqlpane_core::schema::{AnalysisOutput, Row};
use sqlpane_core::session::{EditorHeight, SessionError};
use sqlpane_core::{EditorCollaborators, SqlEditor, SqlEditorProps};
use thiserror::Error;

pub use buffer::{SharedBuffer, TerminalEditor, TerminalWidget, TextBuffer};

const TICK_RATE: Duration = Duration::from_millis(120);
const TOAST_TICKS: u16 = 40;
const COMPLETION_ROWS: usize = 8;
const POPUP_WIDTH: u16 = 56;
const RUN_BUTTON_LABEL: &str = " ▶ Run (F5) ";
const TAB_INDENT: &str = "    ";

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid run shortcut: {0}")]
    Shortcut(#[from] ShortcutParseError),
    #[error("editor session error: {0}")]
    Session(#[from] SessionError),
}

/// Everything the frontend needs to start.
pub struct TuiConfig {
    pub settings: EditorSettings,
    pub analysis: Option<AnalysisOutput>,
    pub factory: Box<dyn EngineFactory>,
    pub initial_sql: String,
}

#[derive(Debug, Clone)]
struct Toast {
    notification: Notification,
    ticks_left: u16,
}

/// Keeps the latest notification on screen for a few seconds.
#[derive(Debug, Clone, Default)]
pub struct ToastSink(Rc<RefCell<Option<Toast>>>);

impl ToastSink {
    #[must_use]
    pub fn current(&self) -> Option<Notification> {
        self.0
            .borrow()
            .as_ref()
            .map(|toast| toast.notification.clone())
    }

    fn tick(&self) {
        let mut slot = self.0.borrow_mut();
        if let Some(toast) = slot.as_mut() {
            toast.ticks_left = toast.ticks_left.saturating_sub(1);
            if toast.ticks_left == 0 {
                *slot = None;
            }
        }
    }
}

impl NotificationSink for ToastSink {
    fn notify(&self, notification: Notification) {
        *self.0.borrow_mut() = Some(Toast {
            notification,
            ticks_left: TOAST_TICKS,
        });
    }
}

type Editor =
    SqlEditor<InMemoryLanguageHost, TerminalWidget, SharedEditorText, SharedResultStore, ToastSink>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectionKey {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Msg {
    Quit,
    Escape,
    RunShortcut(KeyChord),
    RunButton,
    Click { column: u16, row: u16 },
    Insert(char),
    Newline,
    Backspace,
    Delete,
    Navigate(DirectionKey),
    Home,
    End,
    Complete,
    ShowHover,
    ToggleComment,
    Tick,
}

#[derive(Debug, Clone)]
struct CompletionPopup {
    items: Vec<CompletionItem>,
    selected: usize,
}

#[derive(Debug, Clone, Copy)]
struct ScreenLayout {
    header: Rect,
    editor: Rect,
    results: Rect,
    footer: Rect,
    run_button: Rect,
}

struct TuiApp {
    editor: Editor,
    factory: Box<dyn EngineFactory>,
    results: SharedResultStore,
    toasts: ToastSink,
    last_execution: Rc<Cell<Option<usize>>>,
    completion: Option<CompletionPopup>,
    hover: Option<Hover>,
    viewport: Rect,
    should_quit: bool,
}

impl TuiApp {
    fn new(config: TuiConfig) -> Result<Self, TuiError> {
        let TuiConfig {
            settings,
            analysis,
            factory,
            initial_sql,
        } = config;

        let shortcut = settings.run_shortcut()?;
        let options = settings.editor_options();
        let results = SharedResultStore::new();
        let toasts = ToastSink::default();
        let last_execution = Rc::new(Cell::new(None));
        let executed = Rc::clone(&last_execution);

        let mut editor = SqlEditor::new(
            EditorCollaborators {
                host: InMemoryLanguageHost::new(),
                widget: TerminalWidget::default(),
                text: SharedEditorText::new(initial_sql),
                results: results.clone(),
                notifications: toasts.clone(),
            },
            SqlEditorProps {
                on_execute: Some(Box::new(move |rows: &[Row]| {
                    executed.set(Some(rows.len()));
                })),
                height: options.height,
                ..SqlEditorProps::default()
            },
            options,
            CommandSurface::new(shortcut),
        );
        editor.mount()?;

        let mut app = Self {
            editor,
            factory,
            results,
            toasts,
            last_execution,
            completion: None,
            hover: None,
            viewport: Rect::new(0, 0, 100, 30),
            should_quit: false,
        };
        if let Some(analysis) = analysis {
            app.load_analysis(&analysis)?;
        }
        Ok(app)
    }

    fn load_analysis(&mut self, analysis: &AnalysisOutput) -> Result<(), TuiError> {
        let report = self
            .editor
            .observe_analysis(analysis, self.factory.as_ref())?;
        if report.remounted {
            self.close_popups();
        }
        Ok(())
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Quit => self.should_quit = true,
            Msg::Escape => {
                if self.completion.is_some() || self.hover.is_some() {
                    self.close_popups();
                } else {
                    self.should_quit = true;
                }
            }
            Msg::RunShortcut(chord) => {
                self.close_popups();
                self.editor.handle_shortcut(&chord);
            }
            Msg::RunButton => {
                self.close_popups();
                self.editor.click_run_button();
            }
            Msg::Click { column, row } => {
                let layout = screen_layout(self.viewport, self.editor.options().height);
                if layout.run_button.contains(Position::new(column, row)) {
                    self.handle(Msg::RunButton);
                }
            }
            Msg::Insert(ch) => self.insert(ch),
            Msg::Newline => {
                if self.completion.is_some() {
                    self.accept_completion();
                } else {
                    self.edit(|buffer| {
                        buffer.insert_char('\n');
                        true
                    });
                    self.hover = None;
                }
            }
            Msg::Backspace => {
                self.edit(TextBuffer::backspace);
                self.refresh_completions(false);
            }
            Msg::Delete => {
                self.edit(TextBuffer::delete);
                self.refresh_completions(false);
            }
            Msg::Navigate(direction) => self.navigate(direction),
            Msg::Home => self.move_cursor(TextBuffer::move_home),
            Msg::End => self.move_cursor(TextBuffer::move_end),
            Msg::Complete => {
                if self.completion.is_some() {
                    self.accept_completion();
                } else {
                    self.refresh_completions(true);
                    if self.completion.is_none() {
                        self.edit(|buffer| {
                            buffer.insert_str(TAB_INDENT);
                            true
                        });
                    }
                }
            }
            Msg::ShowHover => self.show_hover(),
            Msg::ToggleComment => {
                let marker = self.line_comment();
                self.edit(|buffer| {
                    buffer.toggle_line_comment(&marker);
                    true
                });
            }
            Msg::Tick => self.toasts.tick(),
        }
    }

    fn language_id(&self) -> String {
        self.editor.options().language_id.clone()
    }

    fn line_comment(&self) -> String {
        self.editor
            .host()
            .configuration(&self.language_id())
            .map_or_else(|| "--".to_string(), |config| config.line_comment.clone())
    }

    fn close_popups(&mut self) {
        self.completion = None;
        self.hover = None;
    }

    /// Applies a buffer mutation and reports the new text as a user edit.
    fn edit(&mut self, apply: impl FnOnce(&mut TextBuffer) -> bool) {
        let buffer = self.editor.widget().buffer();
        let changed = apply(&mut buffer.borrow_mut());
        if changed {
            let text = buffer.borrow().text().to_string();
            self.editor.handle_edit(Some(&text));
        }
    }

    fn move_cursor(&mut self, apply: impl FnOnce(&mut TextBuffer)) {
        self.close_popups();
        apply(&mut self.editor.widget().buffer().borrow_mut());
    }

    fn insert(&mut self, ch: char) {
        let language = self.language_id();
        let configuration = self.editor.host().configuration(&language).cloned();
        let closes_pair = configuration.as_ref().is_some_and(|config| {
            config
                .auto_closing_pairs
                .iter()
                .any(|(_, close)| *close == ch)
        });
        let opening = configuration
            .as_ref()
            .and_then(|config| config.closing_for(ch));

        self.edit(|buffer| {
            if closes_pair && buffer.next_char() == Some(ch) {
                buffer.move_right();
                return false;
            }
            match opening {
                Some(close) => buffer.insert_pair(ch, close),
                None => buffer.insert_char(ch),
            }
            true
        });
        self.hover = None;

        let suggest = self.editor.options().quick_suggestions
            && self.editor.host().is_completion_trigger(&language, ch);
        if suggest {
            self.refresh_completions(true);
        } else {
            self.completion = None;
        }
    }

    /// Re-queries completions at the cursor. Opens the popup only when `open`.
    fn refresh_completions(&mut self, open: bool) {
        if !open && self.completion.is_none() {
            return;
        }
        let language = self.language_id();
        let buffer = self.editor.widget().buffer();
        let items = {
            let buffer = buffer.borrow();
            self.editor
                .host()
                .completions(&language, buffer.text(), buffer.cursor())
        };
        if items.is_empty() {
            self.completion = None;
            return;
        }
        let selected = self
            .completion
            .as_ref()
            .map_or(0, |popup| popup.selected.min(items.len() - 1));
        self.completion = Some(CompletionPopup { items, selected });
    }

    fn accept_completion(&mut self) {
        let Some(popup) = self.completion.take() else {
            return;
        };
        let Some(item) = popup.items.get(popup.selected) else {
            return;
        };
        let back = usize::from(item.insert_text.ends_with("()"));
        self.edit(|buffer| {
            buffer.replace_range(item.replace.clone(), &item.insert_text, back);
            true
        });
    }

    fn show_hover(&mut self) {
        self.completion = None;
        if !self.editor.options().hover_enabled {
            return;
        }
        let language = self.language_id();
        let buffer = self.editor.widget().buffer();
        let buffer = buffer.borrow();
        self.hover = self
            .editor
            .host()
            .hover(&language, buffer.text(), buffer.cursor());
    }

    fn navigate(&mut self, direction: DirectionKey) {
        if let Some(popup) = self.completion.as_mut() {
            let count = popup.items.len();
            match direction {
                DirectionKey::Up => {
                    popup.selected = popup.selected.checked_sub(1).unwrap_or(count - 1);
                    return;
                }
                DirectionKey::Down => {
                    popup.selected = (popup.selected + 1) % count;
                    return;
                }
                DirectionKey::Left | DirectionKey::Right => {}
            }
        }

        self.move_cursor(|buffer| match direction {
            DirectionKey::Up => buffer.move_up(),
            DirectionKey::Down => buffer.move_down(),
            DirectionKey::Left => buffer.move_left(),
            DirectionKey::Right => buffer.move_right(),
        });
    }
}

#[must_use]
pub fn ui_name() -> &'static str {
    "sqlpane-tui"
}

pub fn run(config: TuiConfig) -> Result<(), TuiError> {
    let app = TuiApp::new(config)?;
    let (mut terminal, enhanced_keys) = setup_terminal()?;
    let run_result = run_loop(&mut terminal, app);
    let restore_result = restore_terminal(&mut terminal, enhanced_keys);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

/// Returns the terminal and whether keyboard enhancement was pushed. Without it
/// most terminals report Ctrl+Enter as a bare Enter.
fn setup_terminal() -> Result<(Terminal<CrosstermBackend<Stdout>>, bool), TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let enhanced_keys = supports_keyboard_enhancement().unwrap_or(false);
    if enhanced_keys {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
        )?;
    }
    tracing::debug!(enhanced_keys, "terminal ready");
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok((terminal, enhanced_keys))
}

fn restore_terminal(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    enhanced_keys: bool,
) -> Result<(), TuiError> {
    if enhanced_keys {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)?;
    }
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: TuiApp,
) -> Result<(), TuiError> {
    let mut last_tick = Instant::now();

    loop {
        let size = terminal.size()?;
        app.viewport = Rect::new(0, 0, size.width, size.height);
        terminal.draw(|frame| render(frame, &app))?;

        let timeout = TICK_RATE
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)? {
            let message = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    map_key_event(key, &app.editor.commands().shortcut())
                }
                Event::Mouse(mouse) => map_mouse_event(mouse),
                _ => None,
            };
            if let Some(message) = message {
                app.handle(message);
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            app.handle(Msg::Tick);
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    app.editor.teardown();
    Ok(())
}

fn screen_layout(area: Rect, height: EditorHeight) -> ScreenLayout {
    let editor_constraint = match height {
        EditorHeight::Fill => Constraint::Percentage(55),
        EditorHeight::Lines(lines) => Constraint::Length(lines.saturating_add(2)),
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            editor_constraint,
            Constraint::Min(3),
            Constraint::Length(4),
        ])
        .split(area);

    ScreenLayout {
        header: chunks[0],
        editor: chunks[1],
        results: chunks[2],
        footer: chunks[3],
        run_button: run_button_rect(chunks[1]),
    }
}

/// Bottom-right corner inside the editor border.
fn run_button_rect(editor: Rect) -> Rect {
    let inner = editor.inner(Margin::new(1, 1));
    if inner.width == 0 || inner.height == 0 {
        return Rect::default();
    }
    let label_width = u16::try_from(RUN_BUTTON_LABEL.chars().count()).unwrap_or(u16::MAX);
    let width = label_width.min(inner.width);
    Rect::new(inner.right() - width, inner.bottom() - 1, width, 1)
}

fn render(frame: &mut Frame<'_>, app: &TuiApp) {
    let layout = screen_layout(frame.area(), app.editor.options().height);

    render_header(frame, app, layout.header);
    let cursor = render_editor(frame, app, layout.editor);
    render_run_button(frame, app, layout.run_button);
    render_results(frame, app, layout.results);
    render_footer(frame, app, layout.footer);

    if let Some(cursor) = cursor {
        if let Some(popup) = &app.completion {
            render_completion_popup(frame, popup, cursor);
        } else if let Some(hover) = &app.hover {
            render_hover_popup(frame, hover, cursor);
        }
        frame.set_cursor_position(cursor);
    }
}

fn render_header(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let schema = app.editor.schema().map_or_else(
        || "none".to_string(),
        |schema| format!("{} tables", schema.tables.len()),
    );
    let generation = app
        .editor
        .registry()
        .active()
        .map_or(0, |set| set.generation());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            " sqlpane ",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(format!("Schema: {schema}")),
        Span::raw(" | "),
        Span::raw(format!(
            "Engine: {}",
            if app.editor.engine_ready() {
                "ready"
            } else {
                "waiting for schema"
            }
        )),
        Span::raw(" | "),
        Span::raw(format!("Providers: gen {generation}")),
        Span::raw(" | "),
        Span::raw(format!("Session: v{}", app.editor.session().version())),
    ]))
    .block(Block::default().borders(Borders::ALL).title("SQL Editor"));
    frame.render_widget(header, area);
}

/// Draws the buffer and returns the screen position of the cursor.
fn render_editor(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) -> Option<Position> {
    let widget = app.editor.widget();
    let options = widget.options();
    let buffer = widget.buffer();
    let buffer = buffer.borrow();

    let block = Block::default().borders(Borders::ALL).title(format!(
        " Query · {} to run ",
        app.editor.commands().shortcut()
    ));
    let inner = block.inner(area);
    frame.render_widget(block, area);
    if inner.width == 0 || inner.height == 0 {
        return None;
    }

    let gutter: u16 = if options.line_numbers { 5 } else { 0 };
    let text_width = usize::from(inner.width.saturating_sub(gutter)).max(1);
    let (cursor_line, cursor_column) = buffer.line_col();

    let mut rows = Vec::new();
    let mut cursor_row = 0;
    let mut cursor_col = 0;
    for (index, line) in buffer.text().split('\n').enumerate() {
        let chars = line.chars().collect::<Vec<_>>();
        let segments = if options.word_wrap && chars.len() > text_width {
            chars
                .chunks(text_width)
                .map(|chunk| chunk.iter().collect::<String>())
                .collect::<Vec<_>>()
        } else {
            vec![line.to_string()]
        };

        if index == cursor_line {
            let segment = if options.word_wrap {
                (cursor_column / text_width).min(segments.len() - 1)
            } else {
                0
            };
            cursor_row = rows.len() + segment;
            cursor_col = cursor_column - segment * text_width;
        }

        for (segment_index, segment) in segments.into_iter().enumerate() {
            let mut spans = Vec::with_capacity(2);
            if options.line_numbers {
                let number = if segment_index == 0 {
                    format!("{:>3} ", index + 1)
                } else {
                    "    ".to_string()
                };
                spans.push(Span::styled(
                    format!("{number}│"),
                    Style::default().fg(Color::DarkGray),
                ));
            }
            spans.push(Span::raw(segment));
            rows.push(Line::from(spans));
        }
    }

    let visible = usize::from(inner.height);
    let scroll = cursor_row.saturating_sub(visible - 1);
    let paragraph = Paragraph::new(rows).scroll((u16::try_from(scroll).unwrap_or(u16::MAX), 0));
    frame.render_widget(paragraph, inner);

    let x = inner
        .x
        .saturating_add(gutter)
        .saturating_add(u16::try_from(cursor_col).unwrap_or(u16::MAX))
        .min(inner.right().saturating_sub(1));
    let y = inner
        .y
        .saturating_add(u16::try_from(cursor_row - scroll).unwrap_or(u16::MAX));
    Some(Position::new(x, y))
}

fn render_run_button(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let style = if app.editor.button_enabled() {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Green)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray).bg(Color::Black)
    };
    frame.render_widget(Paragraph::new(RUN_BUTTON_LABEL).style(style), area);
}

fn render_results(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let rows = app.results.rows();
    let title = match app.last_execution.get() {
        Some(count) if !rows.is_empty() => format!("Results · {count} rows"),
        _ => "Results".to_string(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let Some(first) = rows.first() else {
        frame.render_widget(Paragraph::new("No results").block(block), area);
        return;
    };

    let columns = first.keys().cloned().collect::<Vec<_>>();
    let header = TableRow::new(columns.iter().map(|column| TableCell::from(column.clone()))).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );
    let body = rows.iter().map(|row| {
        TableRow::new(
            columns
                .iter()
                .map(|column| TableCell::from(display_value(row.get(column)))),
        )
    });
    let widths = vec![Constraint::Fill(1); columns.len()];
    frame.render_widget(Table::new(body, widths).header(header).block(block), area);
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "NULL".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn render_footer(frame: &mut Frame<'_>, app: &TuiApp, area: Rect) {
    let toast = app.toasts.current().map_or_else(
        || Line::from(""),
        |notification| {
            let (marker, color) = match notification.level {
                NotificationLevel::Success => ("✔", Color::Green),
                NotificationLevel::Warning => ("⚠", Color::Yellow),
                NotificationLevel::Error => ("✖", Color::Red),
            };
            Line::from(Span::styled(
                format!("{marker} {}", notification.message),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            ))
        },
    );
    let hints = Line::from(format!(
        "{}: run | F5/click: run button | Tab: complete | Ctrl+K: hover | Ctrl+/: comment | Esc/Ctrl+Q: quit",
        app.editor.commands().shortcut()
    ));

    let footer = Paragraph::new(vec![toast, hints])
        .block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(footer, area);
}

fn popup_rect(anchor: Position, width: u16, height: u16, bounds: Rect) -> Rect {
    let width = width.min(bounds.width);
    let height = height.min(bounds.height);
    let x = anchor.x.min(bounds.right().saturating_sub(width));
    let below = anchor.y.saturating_add(1);
    let y = if below.saturating_add(height) <= bounds.bottom() {
        below
    } else {
        anchor.y.saturating_sub(height)
    };
    Rect::new(x, y, width, height)
}

fn completion_tag(kind: CompletionKind) -> &'static str {
    match kind {
        CompletionKind::Column => "col",
        CompletionKind::Table => "tbl",
        CompletionKind::Function => "fn ",
        CompletionKind::Keyword => "kw ",
    }
}

fn render_completion_popup(frame: &mut Frame<'_>, popup: &CompletionPopup, anchor: Position) {
    let visible = popup.items.len().min(COMPLETION_ROWS);
    let start = popup.selected.saturating_sub(COMPLETION_ROWS - 1);
    let height = u16::try_from(visible).unwrap_or(u16::MAX).saturating_add(2);
    let area = popup_rect(anchor, POPUP_WIDTH, height, frame.area());

    let lines = popup
        .items
        .iter()
        .enumerate()
        .skip(start)
        .take(visible)
        .map(|(index, item)| {
            let style = if index == popup.selected {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(format!("{} ", completion_tag(item.kind)), style.fg(Color::Cyan)),
                Span::styled(item.label.clone(), style.add_modifier(Modifier::BOLD)),
                Span::styled(
                    item.detail
                        .as_deref()
                        .map(|detail| format!("  {detail}"))
                        .unwrap_or_default(),
                    style.fg(Color::DarkGray),
                ),
            ])
        })
        .collect::<Vec<_>>();

    let title = format!("{}/{}", popup.selected + 1, popup.items.len());
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

fn render_hover_popup(frame: &mut Frame<'_>, hover: &Hover, anchor: Position) {
    let lines = hover
        .contents
        .iter()
        .flat_map(|section| section.lines())
        .map(|line| Line::from(line.to_string()))
        .collect::<Vec<_>>();
    let height = u16::try_from(lines.len().min(10))
        .unwrap_or(10)
        .saturating_add(2);
    let area = popup_rect(anchor, POPUP_WIDTH + 8, height, frame.area());

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Hover")),
        area,
    );
}

fn key_chord(key: &KeyEvent) -> Option<KeyChord> {
    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    let code = match key.code {
        KeyCode::Enter => Key::Enter,
        // Legacy encodings deliver Ctrl+Enter as a line feed.
        KeyCode::Char('j') if control => Key::Enter,
        KeyCode::Char(ch) => Key::Char(ch.to_ascii_lowercase()),
        KeyCode::F(number) => Key::F(number),
        _ => return None,
    };
    let modifiers = Modifiers {
        ctrl_cmd: key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER),
        shift: key.modifiers.contains(KeyModifiers::SHIFT),
        alt: key.modifiers.contains(KeyModifiers::ALT),
    };
    Some(KeyChord::new(modifiers, code))
}

fn map_key_event(key: KeyEvent, run_shortcut: &KeyChord) -> Option<Msg> {
    if let Some(chord) = key_chord(&key) {
        if chord == *run_shortcut {
            return Some(Msg::RunShortcut(chord));
        }
    }

    let control = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('q') if control => Some(Msg::Quit),
        KeyCode::Char('k') if control => Some(Msg::ShowHover),
        KeyCode::Char(' ') if control => Some(Msg::Complete),
        KeyCode::Char('/' | '7') if control => Some(Msg::ToggleComment),
        KeyCode::Char(_) if control || key.modifiers.contains(KeyModifiers::ALT) => None,
        KeyCode::Char(ch) => Some(Msg::Insert(ch)),
        KeyCode::Esc => Some(Msg::Escape),
        KeyCode::F(5) => Some(Msg::RunButton),
        KeyCode::Tab => Some(Msg::Complete),
        KeyCode::Enter => Some(Msg::Newline),
        KeyCode::Backspace => Some(Msg::Backspace),
        KeyCode::Delete => Some(Msg::Delete),
        KeyCode::Up => Some(Msg::Navigate(DirectionKey::Up)),
        KeyCode::Down => Some(Msg::Navigate(DirectionKey::Down)),
        KeyCode::Left => Some(Msg::Navigate(DirectionKey::Left)),
        KeyCode::Right => Some(Msg::Navigate(DirectionKey::Right)),
        KeyCode::Home => Some(Msg::Home),
        KeyCode::End => Some(Msg::End),
        _ => None,
    }
}

fn map_mouse_event(mouse: MouseEvent) -> Option<Msg> {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => Some(Msg::Click {
            column: mouse.column,
            row: mouse.row,
        }),
        _ => None,
    }
}
