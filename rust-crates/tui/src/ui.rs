use crate::client::{
    AppSnapshot,
    SequenceFrame,
};
use chrono::{
    DateTime,
    Datelike,
    Local,
    NaiveDate,
    TimeZone,
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
        KeyEventKind,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use flowers::{
    Direction as Adjust,
    HistoryEntry,
    ScoreItem,
    scoring::CharacterMood,
};
use flowers_tui::settings::StorageMode;
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::{
    fmt,
    io::stdout,
};
use tokio::sync::mpsc;

pub type InputEventReceiver = mpsc::UnboundedReceiver<Event>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Adjust { direction: Adjust, index: usize },
    SaveStorageMode(StorageMode),
    ResetAll,
    RefreshCatalog,
    DismissErrors,
}

pub struct UiState {
    mode: Mode,
    increase_count: usize,
    decrease_count: usize,
    history_len: usize,
    busy: bool,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

impl fmt::Debug for UiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiState")
            .field("mode", &self.mode)
            .field("busy", &self.busy)
            .finish()
    }
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            increase_count: 0,
            decrease_count: 0,
            history_len: 0,
            busy: false,
            terminal: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    Picker(PickerState),
    Rewards,
    History { offset: usize },
    Settings { idx: usize },
    ResetConfirm,
    QuitModal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct PickerState {
    direction: Adjust,
    idx: usize,
}

const SETTINGS_ENTRIES: [&str; 3] = [
    "Store on this device",
    "Store on the sync server",
    "Reset all data",
];

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

/// Reads terminal events on a dedicated thread so the async loop never blocks.
pub fn input_event_stream() -> InputEventReceiver {
    let (sender, receiver) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(ev) => {
                    if sender.send(ev).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("terminal input failed: {e}");
                    break;
                }
            }
        }
    });
    receiver
}

pub async fn next_raw_event(input_events: &mut InputEventReceiver) -> Result<Event> {
    input_events
        .recv()
        .await
        .ok_or_else(|| eyre!("terminal input closed"))
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.increase_count = snap.increase_items.len();
    state.decrease_count = snap.decrease_items.len();
    state.history_len = snap.history.len();
    state.busy = snap.busy;
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Map a key press to an app event, updating modal state on the way.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let Event::Key(k) = event else {
        return match event {
            Event::Resize(..) => Some(UserEvent::Redraw),
            _ => None,
        };
    };
    if k.kind != KeyEventKind::Press {
        return None;
    }

    match &mut state.mode {
        Mode::Picker(picker) => {
            let count = match picker.direction {
                Adjust::Increase => state.increase_count,
                Adjust::Decrease => state.decrease_count,
            };
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    picker.idx = picker.idx.saturating_sub(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    picker.idx = (picker.idx + 1).min(count.saturating_sub(1));
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter if count > 0 && !state.busy => {
                    let event = UserEvent::Adjust {
                        direction: picker.direction,
                        index: picker.idx,
                    };
                    state.mode = Mode::Normal;
                    Some(event)
                }
                KeyCode::Char(c) if c.is_ascii_digit() && !state.busy => {
                    let index = c.to_digit(10).map(|d| d as usize)?.checked_sub(1)?;
                    if index >= count {
                        return None;
                    }
                    let event = UserEvent::Adjust {
                        direction: picker.direction,
                        index,
                    };
                    state.mode = Mode::Normal;
                    Some(event)
                }
                _ => None,
            };
        }
        Mode::Rewards => {
            return match k.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('r') => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::History { offset } => {
            return match k.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('h') => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    *offset = offset.saturating_sub(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    *offset = (*offset + 1).min(state.history_len.saturating_sub(1));
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Settings { idx } => {
            return match k.code {
                KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    *idx = idx.saturating_sub(1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    *idx = (*idx + 1).min(SETTINGS_ENTRIES.len() - 1);
                    Some(UserEvent::Redraw)
                }
                KeyCode::Enter => match *idx {
                    0 => {
                        state.mode = Mode::Normal;
                        Some(UserEvent::SaveStorageMode(StorageMode::Local))
                    }
                    1 => {
                        state.mode = Mode::Normal;
                        Some(UserEvent::SaveStorageMode(StorageMode::Remote))
                    }
                    _ => {
                        state.mode = Mode::ResetConfirm;
                        Some(UserEvent::Redraw)
                    }
                },
                _ => None,
            };
        }
        Mode::ResetConfirm => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::ResetAll)
                }
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::QuitModal => {
            return match k.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    state.mode = Mode::Normal;
                    Some(UserEvent::Redraw)
                }
                _ => None,
            };
        }
        Mode::Normal => {}
    }

    match k.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            state.mode = Mode::QuitModal;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('+') | KeyCode::Char('a') if !state.busy => {
            state.mode = Mode::Picker(PickerState {
                direction: Adjust::Increase,
                idx: 0,
            });
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('-') | KeyCode::Char('s') if !state.busy => {
            state.mode = Mode::Picker(PickerState {
                direction: Adjust::Decrease,
                idx: 0,
            });
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('r') => {
            state.mode = Mode::Rewards;
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('h') => {
            state.mode = Mode::History { offset: 0 };
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('o') => {
            state.mode = Mode::Settings { idx: 0 };
            Some(UserEvent::Redraw)
        }
        KeyCode::Char('u') => Some(UserEvent::RefreshCatalog),
        KeyCode::Char('x') => Some(UserEvent::DismissErrors),
        _ => None,
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(9),
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, chunks[0], snap);
    draw_stage(f, chunks[1], snap);
    draw_gauge(f, chunks[2], snap);
    draw_status(f, chunks[3], snap);
    draw_help(f, chunks[4], snap);
    draw_modals(f, state, snap);
}

fn draw_header(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let name = snap.child_name.as_deref().unwrap_or("Little Flowers");
    let tier = snap.tier_name.as_deref().unwrap_or("no tier");
    let text = Line::from(vec![
        Span::styled(
            format!("{name}: {} flowers", snap.score),
            Style::default()
                .fg(mood_color(snap.mood))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" | {tier} | {}", snap.storage_label)),
    ]);
    let widget =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Score"));
    f.render_widget(widget, area);
}

fn draw_stage(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let character = Paragraph::new(
        snap.character_lines
            .iter()
            .map(|line| Line::from(line.clone()))
            .collect::<Vec<_>>(),
    )
    .alignment(Alignment::Center)
    .style(fade_style(snap.character_opacity, mood_color(snap.mood)))
    .block(Block::default().borders(Borders::ALL).title("Buddy"));
    f.render_widget(character, columns[0]);

    let block = Block::default().borders(Borders::ALL).title("Flowers");
    let lines = match &snap.sequence {
        Some(sequence) => sequence_lines(sequence),
        None => vec![Line::from(""), Line::from("Press + or - to adjust")],
    };
    let opacity = snap.sequence.as_ref().map_or(1.0, |s| s.opacity);
    let color = match snap.sequence.as_ref().map(|s| s.direction) {
        Some(Adjust::Decrease) => Color::Magenta,
        _ => Color::Green,
    };
    let widget = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .style(fade_style(opacity, color))
        .block(block);
    f.render_widget(widget, columns[1]);
}

fn sequence_lines(sequence: &SequenceFrame) -> Vec<Line<'static>> {
    let mut roll = Span::raw(format!("{}{}", sequence.direction.sign(), sequence.displayed));
    if sequence.settled {
        roll = roll.bold();
    }
    let mut lines = vec![Line::from(roll), Line::from(sequence.item_label.clone())];
    lines.extend(sequence.lines.iter().map(|line| Line::from(line.clone())));
    lines
}

fn draw_gauge(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(mood_color(snap.mood)))
        .percent(snap.score.min(100) as u16)
        .label(format!("{}/100", snap.score));
    f.render_widget(gauge, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let status_widget = if snap.errors.is_empty() {
        let status = if snap.status.trim().is_empty() {
            "Ready"
        } else {
            snap.status.as_str()
        };
        Paragraph::new(status.to_string())
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(Color::Green))
    } else {
        let lines: Vec<Line> = snap
            .errors
            .iter()
            .rev()
            .map(|e| Line::from(e.clone()))
            .collect();
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Errors (x to dismiss)"))
            .style(Style::default().fg(Color::Red))
    };
    f.render_widget(status_widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let adjust = if snap.busy {
        "(animating)"
    } else {
        "+ add | - subtract"
    };
    let help = Paragraph::new(format!(
        "{adjust} | r rewards | h history | o settings | u reload | q/Esc quit"
    ))
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    match &state.mode {
        Mode::Normal => {}
        Mode::Picker(picker) => {
            let (title, items) = match picker.direction {
                Adjust::Increase => ("Add flowers", &snap.increase_items),
                Adjust::Decrease => ("Subtract flowers", &snap.decrease_items),
            };
            let mut lines = item_lines(items, picker.idx);
            lines.push(Line::from(""));
            lines.push(Line::from("Enter/digit=choose Esc=cancel"));
            render_modal(f, 60, 50, title, lines);
        }
        Mode::Rewards => {
            let tier = snap.tier_name.as_deref().unwrap_or("no tier");
            let mut lines = vec![Line::from(format!("{tier} ({} flowers)", snap.score))];
            lines.push(Line::from(""));
            if snap.rewards.is_empty() {
                lines.push(Line::from("No rewards for this score"));
            }
            for reward in &snap.rewards {
                lines.push(Line::from(format!("  {reward}")));
            }
            render_modal(f, 50, 40, "Rewards", lines);
        }
        Mode::History { offset } => {
            let today = snap.now.with_timezone(&Local).date_naive();
            let mut lines: Vec<Line> = snap
                .history
                .iter()
                .skip(*offset)
                .map(|entry| history_line(entry, today))
                .collect();
            if lines.is_empty() {
                lines.push(Line::from("No adjustments yet"));
            }
            render_modal(f, 70, 70, "History (newest first)", lines);
        }
        Mode::Settings { idx } => {
            let mut lines = vec![
                Line::from(format!("Active storage: {}", snap.active_mode)),
                Line::from(format!("Saved for next start: {}", snap.saved_mode)),
                Line::from(""),
            ];
            for (i, entry) in SETTINGS_ENTRIES.iter().enumerate() {
                let cur = if i == *idx { ">" } else { " " };
                lines.push(Line::from(format!("{cur} {entry}")));
            }
            render_modal(f, 50, 40, "Settings", lines);
        }
        Mode::ResetConfirm => {
            let lines = vec![
                Line::from("Reset the score to 100 and delete all history?"),
                Line::from("y = yes, n/Esc = no"),
            ];
            render_modal(f, 50, 20, "Reset all data", lines);
        }
        Mode::QuitModal => {
            render_modal(f, 30, 20, "Quit", vec![Line::from("Quit? y/n")]);
        }
    }
}

fn render_modal(f: &mut Frame, w: u16, h: u16, title: &str, lines: Vec<Line>) {
    let area = centered_rect(w, h, f.area());
    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let p = Paragraph::new(lines).wrap(Wrap { trim: false });
    f.render_widget(Clear, area);
    f.render_widget(block.clone(), area);
    f.render_widget(p, block.inner(area));
}

fn item_lines(items: &[ScoreItem], selected: usize) -> Vec<Line<'static>> {
    if items.is_empty() {
        return vec![Line::from("No items configured")];
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let cur = if i == selected { ">" } else { " " };
            Line::from(format!(
                "{cur} {}. {} ({})",
                i + 1,
                item.name,
                item.range_label()
            ))
        })
        .collect()
}

fn history_line(entry: &HistoryEntry, today: NaiveDate) -> Line<'static> {
    let when = format_history_time(&entry.timestamp.with_timezone(&Local), today);
    let color = match entry.direction {
        Adjust::Increase => Color::Green,
        Adjust::Decrease => Color::Magenta,
    };
    Line::from(vec![
        Span::raw(format!("{when:<12} ")),
        Span::styled(
            format!("{}{:<3}", entry.direction.sign(), entry.magnitude),
            Style::default().fg(color),
        ),
        Span::raw(format!(
            " {} ({} → {})",
            entry.item_name, entry.score_before, entry.score_after
        )),
    ])
}

/// `Today HH:MM` for entries from `today`, `M/D HH:MM` otherwise.
fn format_history_time<Tz: TimeZone>(timestamp: &DateTime<Tz>, today: NaiveDate) -> String
where
    Tz::Offset: fmt::Display,
{
    let time = timestamp.format("%H:%M");
    if timestamp.date_naive() == today {
        format!("Today {time}")
    } else {
        format!("{}/{} {time}", timestamp.month(), timestamp.day())
    }
}

fn mood_color(mood: CharacterMood) -> Color {
    match mood {
        CharacterMood::Excellent => Color::Green,
        CharacterMood::Good => Color::Yellow,
        CharacterMood::NeedsWork => Color::Red,
    }
}

fn fade_style(opacity: f32, color: Color) -> Style {
    let color = if opacity > 0.66 {
        color
    } else if opacity > 0.33 {
        Color::Gray
    } else {
        Color::DarkGray
    };
    Style::default().fg(color)
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

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
