use crate::client::{
    AppSnapshot,
    PARTICLE_SEED,
};
use chrono::{
    DateTime,
    Utc,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEvent,
        KeyEventKind,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use seal_ledger::{
    AGENTS,
    AgentRegistry,
    LeaderboardEntry,
    Seal,
    rng::{
        Particle,
        particle_field,
    },
    seal::{
        format_time_remaining,
        short_address,
    },
};
use std::io::stdout;
use tokio::sync::mpsc;

const PARTICLE_COUNT: usize = 24;
const DEFAULT_LOCK_HOURS: u64 = 1;
const MAX_LOCK_HOURS: u64 = 24 * 7;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Refresh,
    NextSeal,
    PrevSeal,
    OpenSelected,
    ShowLeaderboard,
    ToggleAsset,
    GeneratePredictions(Vec<u32>),
    DiscardPredictions,
    SealPredictions { lock_secs: u64 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Seals,
    Leaderboard,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    view: View,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    particles: ParticleLayer,
}

#[derive(Clone, Debug, Default, PartialEq)]
enum Mode {
    #[default]
    Normal,
    PredictModal(PredictState),
    QuitModal,
}

#[derive(Clone, Debug, PartialEq)]
struct PredictState {
    cursor: usize,
    chosen: Vec<bool>,
    lock_hours: u64,
}

impl Default for PredictState {
    fn default() -> Self {
        PredictState {
            cursor: 0,
            chosen: vec![true; AGENTS.len()],
            lock_hours: DEFAULT_LOCK_HOURS,
        }
    }
}

impl PredictState {
    fn chosen_ids(&self) -> Vec<u32> {
        AGENTS
            .iter()
            .zip(&self.chosen)
            .filter(|(_, on)| **on)
            .map(|(agent, _)| agent.id)
            .collect()
    }
}

#[derive(Debug, Default)]
struct ParticleLayer {
    area: Rect,
    particles: Vec<Particle>,
}

impl ParticleLayer {
    fn for_area(&mut self, area: Rect) -> &[Particle] {
        if self.area != area {
            self.particles = particle_field(PARTICLE_SEED, area.width, area.height, PARTICLE_COUNT);
            self.area = area;
        }
        &self.particles
    }
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<std::io::Result<Event>>;

/// Reads terminal events on a dedicated thread so the async loop never blocks
/// on `crossterm::event::read`.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            let event = event::read();
            let failed = event.is_err();
            if tx.send(event).is_err() || failed {
                break;
            }
        }
    });
    rx
}

pub async fn next_raw_event(events: &mut InputEventReceiver) -> Result<Event> {
    match events.recv().await {
        Some(event) => Ok(event?),
        None => Err(eyre!("terminal input stream closed")),
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        let res = term.draw(|f| ui(f, state, snap)).map(|_| ());
        state.terminal = Some(term);
        res?;
    }
    Ok(())
}

/// Maps a terminal event to an application event, updating modal state on
/// the way. `None` for events the app ignores.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => interpret_key(state, key),
        Event::Resize(_, _) => Some(UserEvent::Redraw),
        _ => None,
    }
}

fn interpret_key(state: &mut UiState, key: KeyEvent) -> Option<UserEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    match &mut state.mode {
        Mode::QuitModal => {
            return match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::PredictModal(ps) => {
            return match key.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::DiscardPredictions)
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    ps.cursor = ps.cursor.checked_sub(1).unwrap_or(AGENTS.len() - 1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    ps.cursor = (ps.cursor + 1) % AGENTS.len();
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char(' ') => {
                    if let Some(on) = ps.chosen.get_mut(ps.cursor) {
                        *on = !*on;
                    }
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char('+') | KeyCode::Right => {
                    ps.lock_hours = (ps.lock_hours + 1).min(MAX_LOCK_HOURS);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char('-') | KeyCode::Left => {
                    ps.lock_hours = ps.lock_hours.saturating_sub(1).max(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Char('g') => Some(UserEvent::GeneratePredictions(ps.chosen_ids())),
                KeyCode::Enter => {
                    let lock_secs = ps.lock_hours * 3600;
                    state.mode = Mode::Normal;
                    Some(UserEvent::SealPredictions { lock_secs })
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Down | KeyCode::Char('j') => Some(UserEvent::NextSeal),
        KeyCode::Up | KeyCode::Char('k') => Some(UserEvent::PrevSeal),
        KeyCode::Enter | KeyCode::Char('o') => Some(UserEvent::OpenSelected),
        KeyCode::Char('r') => Some(UserEvent::Refresh),
        KeyCode::Char('a') => Some(UserEvent::ToggleAsset),
        KeyCode::Tab | KeyCode::Char('l') => match state.view {
            View::Seals => {
                state.view = View::Leaderboard;
                Some(UserEvent::ShowLeaderboard)
            }
            View::Leaderboard => {
                state.view = View::Seals;
                Some(UserEvent::Redraw)
            }
        },
        KeyCode::Char('n') => {
            let ps = PredictState::default();
            let ids = ps.chosen_ids();
            state.mode = Mode::PredictModal(ps);
            Some(UserEvent::GeneratePredictions(ids))
        }
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &mut UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(8),
            Constraint::Length(6),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, state, chunks[0], snap);
    match state.view {
        View::Seals => draw_seals(f, chunks[1], snap),
        View::Leaderboard => draw_leaderboard(f, chunks[1], &snap.leaderboard),
    }
    draw_status(f, chunks[2], snap);
    draw_help(f, chunks[3], state.view);
    draw_modals(f, state, snap);
}

fn draw_header(f: &mut Frame, state: &mut UiState, area: Rect, snap: &AppSnapshot) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Prophecy Seals");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let buf = f.buffer_mut();
    for p in state.particles.for_area(inner) {
        let symbol = if p.duration % 2 == 0 { "·" } else { "✦" };
        if let Some(cell) = buf.cell_mut((inner.x + p.x, inner.y + p.y)) {
            cell.set_symbol(symbol).set_fg(Color::DarkGray);
        }
    }

    let lines = vec![
        Line::from(format!(
            "Network: {} | Contract: {} | Asset: {}",
            snap.network,
            short_address(&snap.contract_id),
            snap.asset
        )),
        Line::from(format!(
            "Wallet: {} | Seals: {} | Revealing: {}",
            short_address(&snap.wallet_address),
            snap.seals.len(),
            snap.pending_reveals.len()
        )),
    ];
    let text_area = Rect {
        height: inner.height.min(lines.len() as u16),
        ..inner
    };
    f.render_widget(Paragraph::new(lines), text_area);
}

fn draw_seals(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    if snap.seals.is_empty() {
        let empty = Paragraph::new("No seals yet. Press n to make a prediction.")
            .block(Block::default().borders(Borders::ALL).title("Seals"));
        f.render_widget(empty, cols[0]);
    } else {
        let header = Row::new(vec!["Seal", "Unlocks", "Status", "Creator"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let rows = snap.seals.iter().enumerate().map(|(i, seal)| {
            let pending = snap.pending_reveals.contains(&seal.id);
            let label = seal_status_label(seal, snap.now, pending);
            let mut row = Row::new(vec![
                Cell::from(format!("#{}", seal.id)),
                Cell::from(format_unlock_time(seal.unlock_time)),
                Cell::from(label).style(status_style(seal, snap.now, pending)),
                Cell::from(short_address(&seal.creator)),
            ]);
            if i == snap.selected {
                row = row.style(Style::default().add_modifier(Modifier::REVERSED));
            }
            row
        });
        let table = Table::new(
            rows,
            [
                Constraint::Length(6),
                Constraint::Length(18),
                Constraint::Length(14),
                Constraint::Min(12),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Seals"));
        f.render_widget(table, cols[0]);
    }

    let mut lines = Vec::new();
    match snap.selected_seal() {
        None => lines.push(Line::from("Nothing selected")),
        Some(seal) if !seal.is_unlocked => {
            lines.push(Line::from(format!(
                "{} sealed predictions",
                seal.predictions.len()
            )));
            lines.push(Line::from(""));
            lines.push(Line::styled(
                "Prices stay hidden until the seal is revealed.",
                Style::default().fg(Color::DarkGray),
            ));
        }
        Some(seal) => {
            let registry = AgentRegistry::default();
            for (agent_id, price) in seal.pairs() {
                let (avatar, name) = match registry.by_id(agent_id) {
                    Some(agent) => (agent.avatar, agent.name),
                    None => ("❔", "Unknown agent"),
                };
                lines.push(Line::from(format!(
                    "{avatar} {name:<12} {}",
                    format_usd(price)
                )));
            }
            if lines.is_empty() {
                lines.push(Line::from("No predictions"));
            }
        }
    }
    let title = snap
        .selected_seal()
        .map(|seal| format!("Seal #{}", seal.id))
        .unwrap_or_else(|| String::from("Seal"));
    let detail = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(detail, cols[1]);
}

fn draw_leaderboard(f: &mut Frame, area: Rect, entries: &[LeaderboardEntry]) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(5), Constraint::Min(3)])
        .split(area);

    let podium_cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
            Constraint::Ratio(1, 3),
        ])
        .split(rows[0]);
    // second, first, third
    let podium = [(1usize, podium_cols[0]), (0, podium_cols[1]), (2, podium_cols[2])];
    for (rank, cell) in podium {
        let (text, style) = match entries.get(rank) {
            Some(entry) => (
                format!(
                    "{} {}\n{:.1}% accuracy",
                    entry.avatar, entry.name, entry.accuracy
                ),
                podium_style(rank),
            ),
            None => (String::from("-"), Style::default().fg(Color::DarkGray)),
        };
        let widget = Paragraph::new(text)
            .alignment(Alignment::Center)
            .style(style)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("#{}", rank + 1)),
            );
        f.render_widget(widget, cell);
    }

    let header = Row::new(vec!["#", "Agent", "Accuracy", "Predictions", "Wins", "Last price"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let table_rows = entries.iter().enumerate().map(|(i, entry)| {
        Row::new(vec![
            format!("{}", i + 1),
            format!("{} {}", entry.avatar, entry.name),
            format!("{:.1}%", entry.accuracy),
            entry.total_predictions.to_string(),
            entry.win_count.to_string(),
            format_usd(entry.last_price),
        ])
    });
    let table = Table::new(
        table_rows,
        [
            Constraint::Length(3),
            Constraint::Min(16),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(14),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("Leaderboard"));
    f.render_widget(table, rows[1]);
}

fn podium_style(rank: usize) -> Style {
    match rank {
        0 => Style::default().fg(Color::Yellow),
        1 => Style::default().fg(Color::Gray),
        _ => Style::default().fg(Color::LightRed),
    }
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let mut lines: Vec<Line> = Vec::new();
        if snap.status.trim().is_empty() {
            lines.push(Line::from("Ready"));
        } else {
            for line in snap.status.lines() {
                lines.push(Line::from(line.to_string()));
            }
        }
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        // newest first; the panel only fits a few
        let lines: Vec<Line> = snap
            .errors
            .iter()
            .rev()
            .map(|e| Line::from(e.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, view: View) {
    let text = match view {
        View::Seals => {
            "↑/↓ select | Enter/o reveal | n new seal | a asset | r refresh | Tab leaderboard | q/Esc quit"
        }
        View::Leaderboard => "Tab seals | r refresh | a asset | n new seal | q/Esc quit",
    };
    let help = Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    match &state.mode {
        Mode::PredictModal(ps) => {
            let area = centered_rect(60, 60, f.area());
            let block = Block::default()
                .borders(Borders::ALL)
                .title(format!("New {} Seal", snap.asset));
            let mut lines = Vec::new();
            for (i, agent) in AGENTS.iter().enumerate() {
                let cur = if i == ps.cursor { ">" } else { " " };
                let mark = if ps.chosen.get(i).copied().unwrap_or(false) {
                    "[x]"
                } else {
                    "[ ]"
                };
                let price = snap
                    .draft
                    .iter()
                    .find(|p| p.agent_id == agent.id)
                    .map(|p| format_usd(p.price))
                    .unwrap_or_default();
                lines.push(Line::from(format!(
                    "{cur} {mark} {} {:<12} {price}",
                    agent.avatar, agent.name
                )));
            }
            lines.push(Line::from(""));
            lines.push(Line::from(format!(
                "Lock for {} h (+/- to change)",
                ps.lock_hours
            )));
            if snap.creating {
                lines.push(Line::styled(
                    "A seal is being created...",
                    Style::default().fg(Color::Yellow),
                ));
            }
            lines.push(Line::from(
                "Space toggle | g predict | Enter seal | Esc cancel",
            ));
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit Prophecy Seals? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    horizontal[1]
}

fn seal_status_label(seal: &Seal, now: u64, pending: bool) -> String {
    if seal.is_unlocked {
        String::from("revealed")
    } else if pending {
        String::from("revealing…")
    } else {
        format_time_remaining(seal.unlock_time, now)
    }
}

fn status_style(seal: &Seal, now: u64, pending: bool) -> Style {
    if seal.is_unlocked {
        Style::default().fg(Color::Green)
    } else if pending {
        Style::default().fg(Color::Yellow)
    } else if seal.can_unlock(now) {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

fn format_unlock_time(unlock_time: u64) -> String {
    i64::try_from(unlock_time)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| String::from("-"))
}

/// `$1,234.56`
fn format_usd(price: f64) -> String {
    let cents = (price * 100.0).round() as i128;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}${grouped}.{:02}", cents % 100)
}
