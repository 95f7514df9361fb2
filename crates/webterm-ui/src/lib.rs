use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Widget, Wrap};
use ratatui::{Terminal, TerminalOptions, Viewport};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use unicode_width::UnicodeWidthStr;
use webterm_client::{
    BackendClient, DISPATCH_FAILED_LINE, DispatchAction, READBACK_FAILED_LINE, SAVE_FAILED_LINE,
    resolve_action,
};
use webterm_core::{
    AppConfig, CommandIntent, HistoryRing, MemoryUsage, RunResponse, SessionHandle, edit_command,
    read_command,
};
use webterm_observe::Observer;

/// RAII guard that restores the terminal on drop (including panics).
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = crossterm::execute!(io::stdout(), crossterm::cursor::Show);
    }
}

// ─── Output pane ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneKind {
    /// Echo of a submitted command (`$ ls`).
    Command,
    /// Backend output text.
    Output,
    /// Local failure line.
    Error,
    /// Client-side informational line.
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneEntry {
    pub kind: PaneKind,
    pub text: String,
}

/// Accumulated output surface. Entries are flushed into native terminal
/// scrollback exactly once, tracked by index, so a re-render never duplicates
/// lines.
#[derive(Debug, Default)]
pub struct OutputPane {
    entries: Vec<PaneEntry>,
    flushed: usize,
}

impl OutputPane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_command(&mut self, command: &str) {
        self.entries.push(PaneEntry {
            kind: PaneKind::Command,
            text: format!("$ {command}"),
        });
    }

    pub fn push_output(&mut self, text: impl Into<String>) {
        self.entries.push(PaneEntry {
            kind: PaneKind::Output,
            text: text.into(),
        });
    }

    pub fn push_error(&mut self, text: impl Into<String>) {
        self.entries.push(PaneEntry {
            kind: PaneKind::Error,
            text: text.into(),
        });
    }

    pub fn push_info(&mut self, text: impl Into<String>) {
        self.entries.push(PaneEntry {
            kind: PaneKind::Info,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[PaneEntry] {
        &self.entries
    }

    pub fn unflushed(&self) -> &[PaneEntry] {
        &self.entries[self.flushed..]
    }

    pub fn mark_flushed(&mut self) {
        self.flushed = self.entries.len();
    }

    /// Wipes the accumulated surface. The terminal itself is cleared by the
    /// caller; this resets the model so nothing is re-flushed.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.flushed = 0;
    }
}

// ─── Suggestion dropdown ────────────────────────────────────────────────────

/// Dropdown fed from the history ring on every input change. The first item
/// is the accept-on-Tab candidate.
#[derive(Debug, Default)]
pub struct SuggestionMenu {
    items: Vec<String>,
}

impl SuggestionMenu {
    pub fn refresh(&mut self, ring: &HistoryRing, partial: &str) {
        self.items = ring
            .suggest(partial)
            .into_iter()
            .map(ToString::to_string)
            .collect();
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.items.first().map(String::as_str)
    }

    pub fn display_lines(&self, max_rows: usize) -> Vec<String> {
        self.items
            .iter()
            .take(max_rows)
            .enumerate()
            .map(|(i, item)| {
                let marker = if i == 0 { ">" } else { " " };
                format!("{marker} {item}")
            })
            .collect()
    }
}

// ─── Editor overlay ─────────────────────────────────────────────────────────

/// Modal editor state machine. While `Open`, the overlay owns input focus
/// exclusively; the buffer is discarded on every close, saved or not.
#[derive(Debug, Default, PartialEq, Eq)]
pub enum EditorOverlay {
    #[default]
    Closed,
    Open {
        filename: String,
        buffer: String,
        /// Byte offset into `buffer`, always on a char boundary.
        cursor: usize,
    },
}

impl EditorOverlay {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::Open { filename, .. } => Some(filename),
            Self::Closed => None,
        }
    }

    pub fn buffer(&self) -> Option<&str> {
        match self {
            Self::Open { buffer, .. } => Some(buffer),
            Self::Closed => None,
        }
    }

    /// Opens the overlay, discarding any previous buffer unsaved.
    pub fn open(&mut self, filename: impl Into<String>, content: impl Into<String>) {
        *self = Self::Open {
            filename: filename.into(),
            buffer: content.into(),
            cursor: 0,
        };
    }

    /// Closes the overlay, handing back the filename and buffer.
    pub fn take(&mut self) -> Option<(String, String)> {
        match std::mem::take(self) {
            Self::Open {
                filename, buffer, ..
            } => Some((filename, buffer)),
            Self::Closed => None,
        }
    }

    pub fn insert(&mut self, ch: char) {
        if let Self::Open { buffer, cursor, .. } = self {
            buffer.insert(*cursor, ch);
            *cursor += ch.len_utf8();
        }
    }

    pub fn insert_newline(&mut self) {
        self.insert('\n');
    }

    pub fn backspace(&mut self) {
        if let Self::Open { buffer, cursor, .. } = self
            && let Some(prev) = buffer[..*cursor].chars().next_back()
        {
            *cursor -= prev.len_utf8();
            buffer.remove(*cursor);
        }
    }

    pub fn move_left(&mut self) {
        if let Self::Open { buffer, cursor, .. } = self
            && let Some(prev) = buffer[..*cursor].chars().next_back()
        {
            *cursor -= prev.len_utf8();
        }
    }

    pub fn move_right(&mut self) {
        if let Self::Open { buffer, cursor, .. } = self
            && let Some(next) = buffer[*cursor..].chars().next()
        {
            *cursor += next.len_utf8();
        }
    }

    pub fn move_home(&mut self) {
        if let Self::Open { buffer, cursor, .. } = self {
            *cursor = line_start(buffer, *cursor);
        }
    }

    pub fn move_end(&mut self) {
        if let Self::Open { buffer, cursor, .. } = self {
            *cursor = line_end(buffer, *cursor);
        }
    }

    pub fn move_up(&mut self) {
        if let Self::Open { buffer, cursor, .. } = self {
            let start = line_start(buffer, *cursor);
            if start == 0 {
                return;
            }
            let col = buffer[start..*cursor].chars().count();
            let prev_start = line_start(buffer, start - 1);
            *cursor = offset_at_column(buffer, prev_start, col);
        }
    }

    pub fn move_down(&mut self) {
        if let Self::Open { buffer, cursor, .. } = self {
            let end = line_end(buffer, *cursor);
            if end == buffer.len() {
                return;
            }
            let start = line_start(buffer, *cursor);
            let col = buffer[start..*cursor].chars().count();
            *cursor = offset_at_column(buffer, end + 1, col);
        }
    }

    /// Zero-based (line, byte-offset-within-line) of the cursor.
    pub fn cursor_position(&self) -> Option<(usize, usize)> {
        match self {
            Self::Open { buffer, cursor, .. } => {
                let line = buffer[..*cursor].matches('\n').count();
                let start = line_start(buffer, *cursor);
                Some((line, *cursor - start))
            }
            Self::Closed => None,
        }
    }
}

/// Byte offset of the start of the line containing `at`.
fn line_start(buffer: &str, at: usize) -> usize {
    buffer[..at].rfind('\n').map_or(0, |idx| idx + 1)
}

/// Byte offset of the end of the line containing `at` (the `\n` or EOF).
fn line_end(buffer: &str, at: usize) -> usize {
    buffer[at..].find('\n').map_or(buffer.len(), |idx| at + idx)
}

/// Byte offset `col` chars into the line starting at `line_offset`, clamped
/// to that line's end.
fn offset_at_column(buffer: &str, line_offset: usize, col: usize) -> usize {
    let end = line_end(buffer, line_offset);
    let mut offset = line_offset;
    for ch in buffer[line_offset..end].chars().take(col) {
        offset += ch.len_utf8();
    }
    offset
}

// ─── Usage display ──────────────────────────────────────────────────────────

/// Latest resource readings. An update overwrites exactly the fields the
/// response supplied; the other gauge keeps showing its last value. No
/// rolling window, just a single-sample snapshot redrawn each frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSnapshot {
    pub cpu: Option<f64>,
    pub memory: Option<MemoryUsage>,
}

impl UsageSnapshot {
    pub fn apply(&mut self, cpu: Option<f64>, memory: Option<MemoryUsage>) {
        if let Some(cpu) = cpu {
            self.cpu = Some(cpu);
        }
        if let Some(memory) = memory {
            self.memory = Some(memory);
        }
    }
}

// ─── Response application helpers ───────────────────────────────────────────

/// Side-channel updates applied independently of the primary action.
pub fn apply_side_updates(
    response: &RunResponse,
    session: &mut Option<SessionHandle>,
    usage: &mut UsageSnapshot,
) {
    if let (Some(cwd), Some(session)) = (&response.cwd, session.as_mut()) {
        session.set_cwd(cwd.clone());
    }
    if response.has_usage() {
        usage.apply(response.cpu, response.memory);
    }
}

/// Applies the outcome of a save dispatch. The overlay is already closed by
/// the time this runs; a failure is surfaced as an output line only. Returns
/// the failure detail for the observer log, if any.
pub fn finish_save(
    pane: &mut OutputPane,
    session: &mut Option<SessionHandle>,
    result: Result<RunResponse>,
) -> Option<String> {
    match result {
        Ok(response) => {
            if let Some(output) = response.output.as_deref()
                && !output.is_empty()
            {
                pane.push_output(output);
            }
            if let (Some(cwd), Some(session)) = (&response.cwd, session.as_mut()) {
                session.set_cwd(cwd.clone());
            }
            None
        }
        Err(err) => {
            pane.push_error(SAVE_FAILED_LINE);
            Some(err.to_string())
        }
    }
}

// ─── Shell entry point ──────────────────────────────────────────────────────

/// Everything the event loop needs, constructed once at startup. No ambient
/// singletons; torn down when the shell returns.
pub struct ShellContext {
    pub client: BackendClient,
    pub observer: Observer,
    pub cfg: AppConfig,
}

const USAGE_ROWS: u16 = 3;
const INFO_LINE: &str = " Ctrl+C exit | Tab autocomplete | Up/Down history";
const EDITOR_HINT: &str = " Ctrl+S save | Esc cancel";

pub fn run_shell(ctx: ShellContext) -> Result<()> {
    let sigint_flag = Arc::new(AtomicBool::new(false));
    #[cfg(unix)]
    {
        let flag = Arc::clone(&sigint_flag);
        signal_hook::flag::register(signal_hook::consts::SIGINT, flag)?;
    }

    // Restore the terminal before printing any panic.
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = crossterm::execute!(io::stdout(), crossterm::cursor::Show);
        prev_hook(info);
    }));

    print_banner(ctx.client.base_url())?;

    enable_raw_mode()?;
    let _guard = TerminalGuard;
    crossterm::execute!(io::stdout(), crossterm::cursor::Hide)?;
    let backend = CrosstermBackend::new(io::stdout());
    // Inline viewport: gauges + separator + input + dropdown + info line.
    // Everything above is native terminal scrollback.
    let suggestion_rows = ctx.cfg.ui.suggestion_rows.clamp(1, 8) as u16;
    let viewport_height = USAGE_ROWS + 2 + suggestion_rows + 1;
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(viewport_height),
        },
    )?;

    let mut pane = OutputPane::new();
    let mut ring = HistoryRing::new();
    let mut menu = SuggestionMenu::default();
    let mut editor = EditorOverlay::Closed;
    let mut usage = UsageSnapshot::default();
    let mut session: Option<SessionHandle> = None;
    let mut input = String::new();
    let mut cursor_pos: usize = 0;
    let mut tick: usize = 0;

    match ctx.client.init() {
        Ok(handle) => {
            let _ = ctx.observer.record_init(handle.id(), handle.cwd());
            session = Some(handle);
        }
        Err(err) => {
            pane.push_error(DISPATCH_FAILED_LINE);
            let _ = ctx.observer.record_dispatch_failure(&err.to_string());
        }
    }

    loop {
        if sigint_flag.swap(false, Ordering::SeqCst) {
            break;
        }
        tick = tick.wrapping_add(1);
        let cursor_visible = ctx.cfg.ui.reduced_motion || tick % 16 < 8;

        flush_pane_above(&mut terminal, &mut pane)?;
        terminal.draw(|frame| {
            if editor.is_open() {
                draw_editor(frame, &editor, cursor_visible);
            } else {
                draw_shell(
                    frame,
                    &session,
                    &input,
                    cursor_pos,
                    &menu,
                    &usage,
                    suggestion_rows,
                    cursor_visible,
                );
            }
        })?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            break;
        }

        if editor.is_open() {
            handle_editor_key(key, &mut editor, &ctx, &mut session, &mut pane);
            continue;
        }

        match key.code {
            KeyCode::Enter => {
                let command = input.trim().to_string();
                if command.is_empty() {
                    continue;
                }
                input.clear();
                cursor_pos = 0;
                menu.clear();
                pane.push_command(&command);
                // Appended before dispatch so the command is recallable even
                // while the backend is slow or failing.
                ring.append(&command);
                let _ = ctx.observer.record_command(&command);
                dispatch_command(
                    &mut terminal,
                    &ctx,
                    &mut session,
                    &mut pane,
                    &mut usage,
                    &mut editor,
                    &command,
                )?;
            }
            KeyCode::Up => {
                input = ring.recall_previous().to_string();
                cursor_pos = input.len();
                menu.clear();
            }
            KeyCode::Down => {
                input = ring.recall_next().to_string();
                cursor_pos = input.len();
                menu.clear();
            }
            KeyCode::Tab => {
                // The dropdown hides after recall/accept, but Tab still
                // completes from the current partial.
                if menu.is_empty() {
                    menu.refresh(&ring, &input);
                }
                if let Some(first) = menu.first() {
                    input = first.to_string();
                    cursor_pos = input.len();
                    menu.clear();
                }
            }
            KeyCode::Esc => menu.clear(),
            KeyCode::Backspace => {
                if let Some(prev) = input[..cursor_pos].chars().next_back() {
                    cursor_pos -= prev.len_utf8();
                    input.remove(cursor_pos);
                    menu.refresh(&ring, &input);
                }
            }
            KeyCode::Left => {
                if let Some(prev) = input[..cursor_pos].chars().next_back() {
                    cursor_pos -= prev.len_utf8();
                }
            }
            KeyCode::Right => {
                if let Some(next) = input[cursor_pos..].chars().next() {
                    cursor_pos += next.len_utf8();
                }
            }
            KeyCode::Home => cursor_pos = 0,
            KeyCode::End => cursor_pos = input.len(),
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                input.insert(cursor_pos, ch);
                cursor_pos += ch.len_utf8();
                menu.refresh(&ring, &input);
            }
            _ => {}
        }
    }

    // Flush anything still pending so the last lines survive the viewport.
    flush_pane_above(&mut terminal, &mut pane)?;
    Ok(())
}

fn print_banner(base_url: &str) -> Result<()> {
    use std::io::Write;
    let mut out = io::stdout();
    out.write_all(b"\x1b[2J\x1b[H")?;
    let version = env!("CARGO_PKG_VERSION");
    writeln!(out)?;
    writeln!(out, "\x1b[1mwebterm\x1b[0m v{version}")?;
    writeln!(out, "\x1b[36m{base_url}\x1b[0m")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// One command round-trip plus everything the response implies: primary
/// action, session/usage side updates, editor hand-off.
fn dispatch_command(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ctx: &ShellContext,
    session: &mut Option<SessionHandle>,
    pane: &mut OutputPane,
    usage: &mut UsageSnapshot,
    editor: &mut EditorOverlay,
    command: &str,
) -> Result<()> {
    let intent = CommandIntent::resolve(command);
    let session_id = session
        .as_ref()
        .map(|s| s.id().to_string())
        .unwrap_or_default();
    match ctx.client.run(&session_id, command, None) {
        Err(err) => {
            pane.push_error(DISPATCH_FAILED_LINE);
            let _ = ctx.observer.record_dispatch_failure(&err.to_string());
        }
        Ok(response) => {
            match resolve_action(intent, &response) {
                DispatchAction::OpenEditor(filename) => {
                    open_editor(ctx, &session_id, &filename, pane, editor);
                }
                DispatchAction::ClearScreen => {
                    pane.clear();
                    wipe_screen(terminal)?;
                }
                DispatchAction::Print(text) => pane.push_output(text),
                DispatchAction::Silent => {}
            }
            apply_side_updates(&response, session, usage);
        }
    }
    Ok(())
}

/// Secondary read-back: the backend is the single source of truth for file
/// contents, so the buffer is always seeded from a fresh read, never from a
/// client-side cache.
fn open_editor(
    ctx: &ShellContext,
    session_id: &str,
    filename: &str,
    pane: &mut OutputPane,
    editor: &mut EditorOverlay,
) {
    match ctx.client.run(session_id, &read_command(filename), None) {
        Ok(read) => {
            editor.open(filename, read.output.unwrap_or_default());
            let _ = ctx.observer.record_editor("open", filename);
        }
        Err(err) => {
            pane.push_error(READBACK_FAILED_LINE);
            let _ = ctx.observer.record_dispatch_failure(&err.to_string());
        }
    }
}

fn handle_editor_key(
    key: KeyEvent,
    editor: &mut EditorOverlay,
    ctx: &ShellContext,
    session: &mut Option<SessionHandle>,
    pane: &mut OutputPane,
) {
    if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
        if let Some((filename, buffer)) = editor.take() {
            let session_id = session
                .as_ref()
                .map(|s| s.id().to_string())
                .unwrap_or_default();
            let _ = ctx.observer.record_editor("save", &filename);
            let result = ctx
                .client
                .run(&session_id, &edit_command(&filename), Some(&buffer));
            if let Some(detail) = finish_save(pane, session, result) {
                let _ = ctx.observer.record_dispatch_failure(&detail);
            }
        }
        return;
    }
    match key.code {
        KeyCode::Esc => {
            if let Some((filename, _)) = editor.take() {
                let _ = ctx.observer.record_editor("cancel", &filename);
            }
        }
        KeyCode::Enter => editor.insert_newline(),
        KeyCode::Backspace => editor.backspace(),
        KeyCode::Left => editor.move_left(),
        KeyCode::Right => editor.move_right(),
        KeyCode::Up => editor.move_up(),
        KeyCode::Down => editor.move_down(),
        KeyCode::Home => editor.move_home(),
        KeyCode::End => editor.move_end(),
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => editor.insert(ch),
        _ => {}
    }
}

// ─── Rendering ──────────────────────────────────────────────────────────────

fn pane_style(kind: PaneKind) -> Style {
    match kind {
        PaneKind::Command => Style::default().add_modifier(Modifier::BOLD),
        PaneKind::Output => Style::default(),
        PaneKind::Error => Style::default().fg(Color::Red),
        PaneKind::Info => Style::default().fg(Color::DarkGray),
    }
}

fn wrapped_line_height(line: &Line<'_>, width: u16) -> u16 {
    let width = width.max(1) as usize;
    let cells = line.width().max(1);
    (cells.div_ceil(width)) as u16
}

/// Flush new pane entries above the inline viewport into native scrollback.
fn flush_pane_above(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    pane: &mut OutputPane,
) -> Result<()> {
    if pane.unflushed().is_empty() {
        return Ok(());
    }
    let mut lines: Vec<Line<'static>> = Vec::new();
    for entry in pane.unflushed() {
        let style = pane_style(entry.kind);
        for text in entry.text.split('\n') {
            lines.push(Line::from(Span::styled(text.to_string(), style)));
        }
    }
    pane.mark_flushed();

    let viewport_width = terminal.size()?.width.max(1);
    let height = lines
        .iter()
        .map(|line| u32::from(wrapped_line_height(line, viewport_width)))
        .sum::<u32>()
        .min(u32::from(u16::MAX)) as u16;
    if height == 0 {
        return Ok(());
    }
    terminal.insert_before(height, |buf| {
        let area = buf.area;
        let bottom = area.y.saturating_add(area.height);
        let mut y = area.y;
        for line in &lines {
            if y >= bottom {
                break;
            }
            let logical_height = wrapped_line_height(line, area.width);
            let line_area = Rect::new(area.x, y, area.width, logical_height.min(bottom - y));
            Paragraph::new(line.clone())
                .wrap(Wrap { trim: false })
                .render(line_area, buf);
            y = y.saturating_add(logical_height);
        }
    })?;
    Ok(())
}

fn wipe_screen(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    crossterm::execute!(
        io::stdout(),
        crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
        crossterm::cursor::MoveTo(0, 0)
    )?;
    terminal.clear()?;
    Ok(())
}

/// A text line with a block cursor rendered at `cursor` (byte offset).
fn line_with_cursor(text: &str, cursor: usize, visible: bool) -> Vec<Span<'static>> {
    let cursor = cursor.min(text.len());
    let before = &text[..cursor];
    let at = text[cursor..].chars().next();
    let after_start = cursor + at.map_or(0, char::len_utf8);
    let cursor_cell = at.map_or(" ".to_string(), |ch| ch.to_string());
    let cursor_style = if visible {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    vec![
        Span::raw(before.to_string()),
        Span::styled(cursor_cell, cursor_style),
        Span::raw(text[after_start..].to_string()),
    ]
}

#[allow(clippy::too_many_arguments)]
fn draw_shell(
    frame: &mut ratatui::Frame,
    session: &Option<SessionHandle>,
    input: &str,
    cursor_pos: usize,
    menu: &SuggestionMenu,
    usage: &UsageSnapshot,
    suggestion_rows: u16,
    cursor_visible: bool,
) {
    let area = frame.area();
    if area.width == 0 || area.height < 4 {
        return;
    }
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(USAGE_ROWS),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(suggestion_rows),
            Constraint::Length(1),
        ])
        .split(area);

    draw_usage(frame, usage, rows[0]);

    let separator = "─".repeat(area.width as usize);
    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            separator,
            Style::default().fg(Color::DarkGray),
        ))),
        rows[1],
    );

    let prompt = session
        .as_ref()
        .map_or_else(|| "$".to_string(), SessionHandle::prompt);
    let mut spans = vec![Span::styled(
        format!("{prompt} "),
        Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
    )];
    spans.extend(line_with_cursor(input, cursor_pos, cursor_visible));
    // Keep the cursor cell in view when the input outgrows the row.
    let occupied = prompt.width() + 1 + input[..cursor_pos].width() + 1;
    let x_scroll = occupied.saturating_sub(rows[2].width as usize) as u16;
    frame.render_widget(
        Paragraph::new(Line::from(spans)).scroll((0, x_scroll)),
        rows[2],
    );

    let dropdown: Vec<Line> = menu
        .display_lines(suggestion_rows as usize)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let style = if i == 0 {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            Line::from(Span::styled(text, style))
        })
        .collect();
    frame.render_widget(Paragraph::new(dropdown), rows[3]);

    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            INFO_LINE,
            Style::default().fg(Color::DarkGray),
        ))),
        rows[4],
    );
}

fn draw_usage(frame: &mut ratatui::Frame, usage: &UsageSnapshot, area: Rect) {
    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let cpu_pct = usage.cpu.unwrap_or(0.0).clamp(0.0, 100.0);
    let cpu_label = usage
        .cpu
        .map_or_else(|| "--".to_string(), |cpu| format!("{cpu:.1}%"));
    let cpu_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("CPU"))
        .gauge_style(Style::default().fg(Color::Magenta))
        .percent(cpu_pct as u16)
        .label(cpu_label);
    frame.render_widget(cpu_gauge, halves[0]);

    let mem_pct = usage
        .memory
        .map(|m| m.percent.clamp(0.0, 100.0))
        .unwrap_or(0.0);
    let mem_label = usage.memory.map_or_else(
        || "--".to_string(),
        |m| match m.total {
            Some(total) => format!("{:.1}% used ({total} MB)", m.percent),
            None => format!("{:.1}% used", m.percent),
        },
    );
    let mem_gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Memory"))
        .gauge_style(Style::default().fg(Color::Blue))
        .percent(mem_pct as u16)
        .label(mem_label);
    frame.render_widget(mem_gauge, halves[1]);
}

fn draw_editor(frame: &mut ratatui::Frame, editor: &EditorOverlay, cursor_visible: bool) {
    let EditorOverlay::Open {
        filename, buffer, ..
    } = editor
    else {
        return;
    };
    let area = frame.area();
    if area.width < 2 || area.height < 3 {
        return;
    }
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(2), Constraint::Length(1)])
        .split(area);

    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {filename} "));
    let inner = block.inner(rows[0]);
    frame.render_widget(block, rows[0]);

    let (cursor_line, cursor_col) = editor.cursor_position().unwrap_or((0, 0));
    let visible_rows = inner.height.max(1) as usize;
    let scroll = cursor_line.saturating_sub(visible_rows - 1);

    let mut lines: Vec<Line> = Vec::new();
    for (idx, text) in buffer.split('\n').enumerate() {
        if idx == cursor_line {
            lines.push(Line::from(line_with_cursor(text, cursor_col, cursor_visible)));
        } else {
            lines.push(Line::from(text.to_string()));
        }
    }
    frame.render_widget(Paragraph::new(lines).scroll((scroll as u16, 0)), inner);

    frame.render_widget(
        Paragraph::new(Line::from(Span::styled(
            EDITOR_HINT,
            Style::default().fg(Color::DarkGray),
        ))),
        rows[1],
    );
}
