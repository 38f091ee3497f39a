use std::collections::VecDeque;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, Wrap};

use crate::error::FetchError;
use crate::manifest::human_size;
use crate::progress::{Confirm, ProgressEvent, ProgressSink, ProgressUnit};

const EVENTS_MAX: usize = 8;
const SPINNER: &[char] = &['|', '/', '-', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Download,
    Extract,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Fetch => "download + extract",
            Operation::Download => "download",
            Operation::Extract => "extract",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Fetch,
    Extract,
    Report,
    Rollback,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Fetch => "Fetch",
            Phase::Extract => "Extract",
            Phase::Report => "Report",
            Phase::Rollback => "Rollback",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transfer {
    unit: ProgressUnit,
    done: u64,
    total: Option<u64>,
}

struct PendingConfirm {
    prompt: String,
    reply: Sender<bool>,
}

struct AppState {
    status: String,
    phase: Phase,
    transfer: Option<Transfer>,
    events: VecDeque<String>,
    pending: Option<PendingConfirm>,
    detached: bool,
    started: Instant,
}

pub struct Tui {
    operation: Operation,
    state: Arc<Mutex<AppState>>,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event {
            ProgressEvent::Message(message) => {
                let message = message.trim().to_string();
                if let Some((phase, payload)) = parse_phase(&message) {
                    if phase != state.phase {
                        state.transfer = None;
                    }
                    state.phase = phase;
                    state.status = payload.to_string();
                } else {
                    state.status = message.clone();
                }
                push_event(&mut state.events, format!("[{}] {message}", timestamp()));
            }
            ProgressEvent::Advance { unit, done, total } => {
                state.transfer = Some(Transfer { unit, done, total });
            }
        }
    }
}

/// Hands the question to the render loop and blocks until a key answers it.
struct TuiConfirm {
    state: Arc<Mutex<AppState>>,
}

impl Confirm for TuiConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        let (tx, rx) = mpsc::channel();
        match self.state.lock() {
            Ok(state) if state.detached => return false,
            Ok(mut state) => {
                state.pending = Some(PendingConfirm {
                    prompt: prompt.to_string(),
                    reply: tx,
                });
            }
            Err(_) => return false,
        }
        rx.recv().unwrap_or(false)
    }
}

/// Leaves raw mode and the alternate screen however the render loop exits.
struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> miette::Result<Self> {
        enable_raw_mode().into_diagnostic()?;
        if let Err(err) = io::stdout().execute(EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(err).into_diagnostic();
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
    }
}

impl Tui {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            state: Arc::new(Mutex::new(AppState {
                status: "starting".to_string(),
                phase: Phase::Resolve,
                transfer: None,
                events: VecDeque::new(),
                pending: None,
                detached: false,
                started: Instant::now(),
            })),
        }
    }

    /// Run `f` on a worker thread while drawing its progress.
    ///
    /// The worker always runs to completion and is joined before this returns,
    /// so its own rollback and cleanup happen even if the display fails.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink, &dyn Confirm) -> Result<R, FetchError> + Send + 'static,
        R: Send + 'static,
    {
        let guard = TerminalGuard::enter()?;

        let (tx, rx) = mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let confirm = TuiConfirm {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink, &confirm)));

        let rendered = self.render_until_done(&rx);
        drop(guard);

        let outcome = match rendered {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "terminal display failed, waiting for the operation");
                self.detach();
                rx.recv().ok()
            }
        };
        if handle.join().is_err() {
            return Err(miette::Report::msg("operation thread panicked"));
        }
        match outcome {
            Some(result) => result.map_err(miette::Report::new),
            None => Err(miette::Report::msg("operation stopped without a result")),
        }
    }

    /// Draw until the worker reports back. `None` means the worker hung up without a result.
    fn render_until_done<R>(
        &mut self,
        rx: &Receiver<Result<R, FetchError>>,
    ) -> miette::Result<Option<Result<R, FetchError>>> {
        let backend = CrosstermBackend::new(io::stdout());
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let mut tick = 0usize;
        loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self.operation, &state, tick))
                    .into_diagnostic()?;
            }

            match rx.try_recv() {
                Ok(result) => return Ok(Some(result)),
                Err(TryRecvError::Disconnected) => return Ok(None),
                Err(TryRecvError::Empty) => {}
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key.code);
                    }
                }
            }

            tick = tick.wrapping_add(1);
        }
    }

    /// Answers a pending confirmation; other keys are ignored while work runs.
    fn handle_key(&mut self, code: KeyCode) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let Some(pending) = state.pending.take() else {
            return;
        };
        let answer = match code {
            KeyCode::Char('y') | KeyCode::Char('Y') => true,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
            _ => {
                state.pending = Some(pending);
                return;
            }
        };
        let _ = pending.reply.send(answer);
    }

    /// Stop routing questions to the screen: pending and future prompts are declined.
    fn detach(&self) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.detached = true;
        if let Some(pending) = state.pending.take() {
            let _ = pending.reply.send(false);
        }
    }
}

fn draw_ui(frame: &mut ratatui::Frame, operation: Operation, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(operation, state, tick), chunks[0]);
    frame.render_widget(draw_gauge(state), chunks[1]);
    frame.render_widget(draw_events(state), chunks[2]);
    frame.render_widget(
        Paragraph::new(Span::styled(
            "y/n answers prompts",
            Style::default().fg(Color::DarkGray),
        )),
        chunks[3],
    );

    if let Some(pending) = &state.pending {
        let area = centered(frame.area(), 60, 5);
        let dialog = Paragraph::new(vec![
            Line::from(pending.prompt.clone()),
            Line::from("Press y to confirm, n to cancel."),
        ])
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Confirm"));
        frame.render_widget(Clear, area);
        frame.render_widget(dialog, area);
    }
}

fn draw_header(operation: Operation, state: &AppState, tick: usize) -> Paragraph<'static> {
    let spinner = SPINNER[tick % SPINNER.len()];
    let elapsed = state.started.elapsed().as_secs();
    Paragraph::new(vec![Line::from(vec![
        Span::styled(
            "xfetch ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{} {spinner} ", operation.label())),
        Span::styled(
            format!("[{}] ", state.phase.label()),
            Style::default().fg(Color::Yellow),
        ),
        Span::raw(format!("{elapsed}s  ")),
        Span::raw(state.status.clone()),
    ])])
    .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_gauge(state: &AppState) -> Gauge<'static> {
    let (ratio, label) = match state.transfer {
        Some(transfer) => transfer_label(transfer),
        None => (0.0, "waiting".to_string()),
    };
    Gauge::default()
        .block(Block::default().borders(Borders::NONE))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(label)
}

fn draw_events(state: &AppState) -> Paragraph<'static> {
    let lines: Vec<Line> = state
        .events
        .iter()
        .map(|event| Line::from(event.clone()))
        .collect();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::TOP).title("Events"))
        .wrap(Wrap { trim: true })
}

fn transfer_label(transfer: Transfer) -> (f64, String) {
    let render = |value: u64| match transfer.unit {
        ProgressUnit::Bytes => human_size(value),
        ProgressUnit::Entries => value.to_string(),
    };
    match transfer.total {
        Some(total) if total > 0 => {
            let ratio = (transfer.done as f64 / total as f64).clamp(0.0, 1.0);
            (ratio, format!("{} / {}", render(transfer.done), render(total)))
        }
        _ => (0.0, render(transfer.done)),
    }
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (name, payload) = rest.split_once(';')?;
    let phase = match name.trim() {
        "Resolve" => Phase::Resolve,
        "Fetch" => Phase::Fetch,
        "Extract" => Phase::Extract,
        "Report" => Phase::Report,
        "Rollback" => Phase::Rollback,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn centered(area: Rect, width_percent: u16, height: u16) -> Rect {
    let width = area.width * width_percent / 100;
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height: height.min(area.height),
    }
}

fn push_event(buffer: &mut VecDeque<String>, item: String) {
    if buffer.len() >= EVENTS_MAX {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_messages_are_parsed() {
        let (phase, payload) = parse_phase("phase=Extract; inner.zip (3 entries)").unwrap();
        assert_eq!(phase, Phase::Extract);
        assert_eq!(payload, "inner.zip (3 entries)");
        assert!(parse_phase("plain status").is_none());
        assert!(parse_phase("phase=Unknown; x").is_none());
    }

    #[test]
    fn transfer_label_with_unknown_total() {
        let (ratio, label) = transfer_label(Transfer {
            unit: ProgressUnit::Bytes,
            done: 2048,
            total: None,
        });
        assert_eq!(ratio, 0.0);
        assert_eq!(label, "2.0KB");
    }

    #[test]
    fn transfer_label_with_total() {
        let (ratio, label) = transfer_label(Transfer {
            unit: ProgressUnit::Entries,
            done: 1,
            total: Some(4),
        });
        assert_eq!(ratio, 0.25);
        assert_eq!(label, "1 / 4");
    }

    #[test]
    fn detached_display_declines_prompts() {
        let tui = Tui::new(Operation::Fetch);
        tui.detach();
        let confirm = TuiConfirm {
            state: tui.state.clone(),
        };
        assert!(!confirm.confirm("File size is 2.0GB. Continue?"));
    }

    #[test]
    fn keys_only_answer_pending_prompts() {
        let mut tui = Tui::new(Operation::Fetch);
        tui.handle_key(KeyCode::Char('q'));
        tui.handle_key(KeyCode::Esc);

        let (tx, rx) = mpsc::channel();
        tui.state.lock().unwrap().pending = Some(PendingConfirm {
            prompt: "Continue?".to_string(),
            reply: tx,
        });
        tui.handle_key(KeyCode::Char('q'));
        assert!(tui.state.lock().unwrap().pending.is_some());
        tui.handle_key(KeyCode::Char('y'));
        assert!(tui.state.lock().unwrap().pending.is_none());
        assert!(rx.recv().unwrap());
    }

    #[test]
    fn tui_confirm_declines_when_render_loop_is_gone() {
        let tui = Tui::new(Operation::Download);
        let confirm = TuiConfirm {
            state: tui.state.clone(),
        };
        let state = tui.state.clone();
        let answer = thread::spawn(move || confirm.confirm("File size is 2.0GB. Continue?"));
        loop {
            let pending = state.lock().unwrap().pending.take();
            if let Some(pending) = pending {
                drop(pending.reply);
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!answer.join().unwrap());
    }
}
