//! Terminal rendering for `slv watch`.
//!
//! Two presenters share the same cell formatting:
//! - [`TablePresenter`] redraws a full-screen table with `crossterm`
//!   (alternate screen, fresh rows highlighted, key hints in the footer).
//! - [`LinePresenter`] appends lines for pipes and `--json`.
//!
//! [`KeyboardCommands`] turns key presses into watch commands.

#![allow(missing_docs)]

use std::io::{self, Write};
use std::time::{Duration, Instant};

use colored::Colorize;
use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::{Attribute, Color, SetAttribute, SetForegroundColor};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{execute, queue};

use crate::fetch::FetchError;
use crate::model::record::{DataFamily, Payload, Record, SequenceKey};
use crate::model::scope::ScopeChange;
use crate::present::Presentation;
use crate::present::format::{DisplayClock, format_measurement};
use crate::runtime::watch::{CommandSource, WatchCommand};
use crate::sync::diff::LiveView;
use crate::sync::scheduler::ViewTarget;

// ──────────────────── cells ────────────────────

pub const READING_HEADERS: [&str; 6] = [
    "Date",
    "Time",
    "Sensor",
    "Trial",
    "Temperature (°C)",
    "Humidity (%)",
];

pub const LOG_HEADERS: [&str; 5] = ["ID", "Date", "Time", "Tag", "Event"];

#[must_use]
pub const fn headers(family: DataFamily) -> &'static [&'static str] {
    match family {
        DataFamily::Readings => &READING_HEADERS,
        DataFamily::Logs => &LOG_HEADERS,
    }
}

/// Display cells for one row, measurements at two decimals.
#[must_use]
pub fn display_cells(record: &Record, clock: &DisplayClock) -> Vec<String> {
    let date = record
        .occurred_at
        .map_or_else(|| "-".to_string(), |at| clock.format_date(at));
    let time = record
        .occurred_at
        .map_or_else(|| "-".to_string(), |at| clock.format_time(at));

    match &record.payload {
        Payload::Reading(reading) => vec![
            date,
            time,
            reading.sensor_id.to_string(),
            reading.trial_name.clone().unwrap_or_else(|| "-".to_string()),
            format_measurement(reading.temperature_c),
            format_measurement(reading.humidity_pct),
        ],
        Payload::Log(event) => vec![
            record.key.to_string(),
            date,
            time,
            event.tag.clone(),
            event.message.clone(),
        ],
    }
}

/// Column widths fitting the headers and every row.
fn column_widths(family: DataFamily, rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers(family).iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    widths
}

fn join_cells<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let mut line = String::new();
    for (index, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if index > 0 {
            line.push_str("  ");
        }
        line.push_str(&format!("{:<width$}", cell.as_ref(), width = *width));
    }
    line.trim_end().to_string()
}

fn truncate(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        line.to_string()
    } else {
        line.chars().take(width.saturating_sub(1)).chain(['…']).collect()
    }
}

fn status_line(target: &ViewTarget, state: &str) -> String {
    format!(" {} {}  [{state}]", target.family.label(), target.scope)
}

// ──────────────────── full-screen table ────────────────────

const MAX_CAPTURED_ROWS: usize = 500;

/// Raw mode plus alternate screen for the lifetime of the guard.
pub struct ScreenGuard;

impl ScreenGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Hide)?;
        Ok(Self)
    }
}

impl Drop for ScreenGuard {
    fn drop(&mut self) {
        let _ = execute!(io::stdout(), Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

pub struct TablePresenter<W: Write> {
    out: W,
    clock: DisplayClock,
    target: Option<ViewTarget>,
    state: String,
    notice: Option<String>,
    rows: Vec<(Vec<String>, Option<Instant>)>,
    draw_failures: u64,
}

impl<W: Write> TablePresenter<W> {
    pub fn new(out: W, clock: DisplayClock) -> Self {
        Self {
            out,
            clock,
            target: None,
            state: "loading".to_string(),
            notice: None,
            rows: Vec::new(),
            draw_failures: 0,
        }
    }

    /// Frames that failed to reach the terminal.
    #[must_use]
    pub const fn draw_failures(&self) -> u64 {
        self.draw_failures
    }

    /// Snapshot the cells of `view` so later frames can redraw without it.
    fn capture(&mut self, view: &LiveView) {
        self.rows = view
            .rows()
            .iter()
            .take(MAX_CAPTURED_ROWS)
            .map(|row| (display_cells(&row.record, &self.clock), row.fresh_until))
            .collect();
    }

    fn redraw(&mut self) {
        if let Err(e) = self.draw() {
            self.draw_failures += 1;
            if self.draw_failures == 1 {
                eprintln!("[SLV-SYNC] terminal draw failed: {e}");
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn draw(&mut self) -> io::Result<()> {
        let (cols, rows) = terminal::size().unwrap_or((100, 30));
        let width = usize::from(cols);
        let body_rows = usize::from(rows).saturating_sub(4);

        queue!(self.out, MoveTo(0, 0), Clear(ClearType::All))?;
        let Some(target) = self.target.clone() else {
            write!(self.out, " no view selected")?;
            return self.out.flush();
        };

        queue!(
            self.out,
            SetForegroundColor(Color::Cyan),
            SetAttribute(Attribute::Bold)
        )?;
        write!(self.out, "{}", truncate(&status_line(&target, &self.state), width))?;
        queue!(self.out, SetAttribute(Attribute::Reset))?;

        let now = Instant::now();
        let visible = &self.rows[..self.rows.len().min(body_rows)];
        let plain: Vec<Vec<String>> = visible.iter().map(|(cells, _)| cells.clone()).collect();
        let widths = column_widths(target.family, &plain);

        queue!(
            self.out,
            MoveTo(0, 2),
            SetAttribute(Attribute::Underlined)
        )?;
        write!(
            self.out,
            "{}",
            truncate(&join_cells(headers(target.family), &widths), width)
        )?;
        queue!(self.out, SetAttribute(Attribute::Reset))?;

        if visible.is_empty() {
            queue!(self.out, MoveTo(0, 3), SetForegroundColor(Color::DarkGrey))?;
            write!(self.out, " (no data)")?;
            queue!(self.out, SetAttribute(Attribute::Reset))?;
        }
        for (index, (row, fresh_until)) in visible.iter().enumerate() {
            let fresh = fresh_until.is_some_and(|until| now < until);
            let color = if fresh { Color::Green } else { Color::White };
            queue!(
                self.out,
                MoveTo(0, 3 + index as u16),
                SetForegroundColor(color)
            )?;
            write!(self.out, "{}", truncate(&join_cells(row, &widths), width))?;
        }
        queue!(self.out, SetAttribute(Attribute::Reset))?;

        let footer = self.notice.as_deref().unwrap_or("q quit  r refresh  l readings/logs  e export");
        queue!(
            self.out,
            MoveTo(0, rows.saturating_sub(1)),
            SetForegroundColor(Color::DarkGrey)
        )?;
        write!(self.out, "{}", truncate(footer, width))?;
        queue!(self.out, SetAttribute(Attribute::Reset))?;
        self.out.flush()
    }
}

impl<W: Write> Presentation for TablePresenter<W> {
    fn render_snapshot(&mut self, target: &ViewTarget, view: &LiveView) {
        self.target = Some(target.clone());
        self.state = format!("live, {} rows", view.len());
        self.capture(view);
        self.redraw();
    }

    fn render_new(&mut self, target: &ViewTarget, view: &LiveView, inserted: &[SequenceKey]) {
        self.target = Some(target.clone());
        self.state = format!("live, {} rows, {} new", view.len(), inserted.len());
        self.capture(view);
        self.redraw();
    }

    fn render_error(&mut self, target: &ViewTarget, error: &FetchError, consecutive_failures: u32) {
        self.target = Some(target.clone());
        self.state = format!("error x{consecutive_failures}: {error}");
        // Rows stay on screen; only the header changes.
        self.redraw();
    }

    fn render_empty(&mut self, target: &ViewTarget) {
        self.target = Some(target.clone());
        self.state = "no data".to_string();
        self.rows.clear();
        self.redraw();
    }

    fn scope_changed(&mut self, change: &ScopeChange) {
        if change.identity_changed() {
            self.state = "loading".to_string();
            self.rows.clear();
        }
    }

    fn fresh_expired(&mut self, view: &LiveView, _keys: &[SequenceKey]) {
        self.capture(view);
        self.redraw();
    }

    fn notice(&mut self, message: &str) {
        self.notice = Some(message.to_string());
        self.redraw();
    }
}

// ──────────────────── line output ────────────────────

/// Append-only output: full snapshot once, then only new rows.
pub struct LinePresenter<W: Write> {
    out: W,
    clock: DisplayClock,
    json: bool,
    color: bool,
}

impl<W: Write> LinePresenter<W> {
    pub fn new(out: W, clock: DisplayClock, json: bool, color: bool) -> Self {
        Self {
            out,
            clock,
            json,
            color,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{line}") {
            eprintln!("[SLV-SYNC] output write failed: {e}");
        }
    }

    fn record_line(&self, record: &Record, fresh: bool) -> String {
        if self.json {
            return serde_json::to_string(record).unwrap_or_default();
        }
        let cells = display_cells(record, &self.clock);
        let line = cells.join("  ");
        match (fresh, self.color) {
            (true, true) => format!("+ {}", line.green()),
            (true, false) => format!("+ {line}"),
            (false, _) => format!("  {line}"),
        }
    }

    fn event_line(&self, event: &str, target: &ViewTarget, extra: Option<(&str, String)>) -> String {
        if self.json {
            let mut value = serde_json::json!({
                "event": event,
                "scope": target.scope.to_string(),
                "family": target.family.label(),
            });
            if let (Some((key, detail)), Some(map)) = (extra, value.as_object_mut()) {
                map.insert(key.to_string(), serde_json::Value::String(detail));
            }
            return value.to_string();
        }
        match extra {
            Some((_, detail)) => format!("# {event} {target}: {detail}"),
            None => format!("# {event} {target}"),
        }
    }
}

impl<W: Write> Presentation for LinePresenter<W> {
    fn render_snapshot(&mut self, target: &ViewTarget, view: &LiveView) {
        if !self.json {
            let header = headers(target.family).join("  ");
            let line = format!("# {target}\n  {header}");
            self.emit(&line);
        }
        let lines: Vec<String> = view
            .records()
            .map(|record| self.record_line(record, false))
            .collect();
        for line in lines {
            self.emit(&line);
        }
    }

    fn render_new(&mut self, _target: &ViewTarget, view: &LiveView, inserted: &[SequenceKey]) {
        // Oldest first so the stream reads chronologically.
        let lines: Vec<String> = inserted
            .iter()
            .rev()
            .filter_map(|key| view.records().find(|record| &record.key == key))
            .map(|record| self.record_line(record, true))
            .collect();
        for line in lines {
            self.emit(&line);
        }
    }

    fn render_error(&mut self, target: &ViewTarget, error: &FetchError, consecutive_failures: u32) {
        let mut line = self.event_line(
            "fetch-error",
            target,
            Some(("error", format!("{error} (x{consecutive_failures})"))),
        );
        if self.color && !self.json {
            line = line.red().to_string();
        }
        self.emit(&line);
    }

    fn render_empty(&mut self, target: &ViewTarget) {
        let line = self.event_line("no-data", target, None);
        self.emit(&line);
    }

    fn notice(&mut self, message: &str) {
        if self.json {
            let line = serde_json::json!({ "event": "notice", "message": message }).to_string();
            self.emit(&line);
        } else {
            self.emit(&format!("# {message}"));
        }
    }
}

// ──────────────────── keyboard ────────────────────

/// Non-blocking keyboard reader for the full-screen view.
#[derive(Debug, Default)]
pub struct KeyboardCommands;

impl KeyboardCommands {
    #[must_use]
    pub fn map_key(code: KeyCode, modifiers: KeyModifiers) -> Option<WatchCommand> {
        match code {
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                Some(WatchCommand::Stop)
            }
            KeyCode::Char('q') | KeyCode::Esc => Some(WatchCommand::Stop),
            KeyCode::Char('r') => Some(WatchCommand::Refresh),
            KeyCode::Char('l') | KeyCode::Tab => Some(WatchCommand::ToggleFamily),
            KeyCode::Char('e') => Some(WatchCommand::Export),
            _ => None,
        }
    }
}

impl CommandSource for KeyboardCommands {
    fn next_command(&mut self) -> Option<WatchCommand> {
        while event::poll(Duration::ZERO).ok()? {
            if let Event::Key(key) = event::read().ok()?
                && key.kind == KeyEventKind::Press
                && let Some(command) = Self::map_key(key.code, key.modifiers)
            {
                return Some(command);
            }
        }
        None
    }
}
