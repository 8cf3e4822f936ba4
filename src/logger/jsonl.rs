//! Append-only JSONL activity log.
//!
//! One self-contained JSON object per line, written with a single `write_all`
//! so tailing readers never observe half a line.
//!
//! When the primary file cannot be written the writer steps down a chain:
//! primary path, then fallback path, then stderr with a `[SLV-JSONL]` prefix,
//! then silent discard. Logging never takes the sync loop down.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SlvError};

const WRITE_BUFFER_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Activity event kinds recorded by the live view client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    SessionStop,
    ViewActivate,
    ViewDeactivate,
    ScopeChange,
    SnapshotMerge,
    FetchFailure,
    TickSkip,
    StaleDiscard,
    ExportWrite,
    ConfigReload,
    Error,
}

/// One JSONL line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: Option<EventType>,
    pub severity: Option<Severity>,
    /// Scope label, `controller/trial` or `controller/*`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick: Option<u64>,
    /// Rows inserted by a merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_records: Option<usize>,
    /// Rows displayed after the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// New entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: utc_now_millis(),
            event: Some(event),
            severity: Some(severity),
            ..Self::default()
        }
    }
}

/// Where lines currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl WriterState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this size.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<path>.1` .. `<path>.N`.
    pub max_rotated_files: u32,
    pub fsync_interval: Duration,
}

impl JsonlConfig {
    /// Config for `path` with a temp-dir fallback and default limits.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path: Some(std::env::temp_dir().join("slv-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval: Duration::from_secs(10),
        }
    }
}

pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
    last_fsync: Instant,
}

impl JsonlWriter {
    /// Open the log, stepping down the fallback chain as needed.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            state: WriterState::Discard,
            bytes_written: 0,
            last_fsync: Instant::now(),
        };
        writer.open_primary();
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(err) => {
                let _ = writeln!(io::stderr(), "[SLV-JSONL] serialize error: {err}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
            let _ = file.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    #[must_use]
    pub const fn state(&self) -> WriterState {
        self.state
    }

    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Return to the primary path if it has become writable again.
    pub fn try_recover(&mut self) {
        if self.state == WriterState::Primary {
            return;
        }
        if let Ok((file, size)) = open_append(&self.config.path) {
            self.file = Some(BufWriter::with_capacity(WRITE_BUFFER_BYTES, file));
            self.state = WriterState::Primary;
            self.bytes_written = size;
            let _ = writeln!(
                io::stderr(),
                "[SLV-JSONL] recovered primary path {}",
                self.config.path.display()
            );
        }
    }

    // ──────────────────── internals ────────────────────

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if matches!(self.state, WriterState::Primary | WriterState::Fallback)
            && self.bytes_written > 0
            && self.bytes_written + len > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::Primary | WriterState::Fallback => {
                let written = self
                    .file
                    .as_mut()
                    .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                if written {
                    self.bytes_written += len;
                    if self.last_fsync.elapsed() >= self.config.fsync_interval {
                        self.fsync();
                    }
                } else {
                    self.step_down();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[SLV-JSONL] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.file = Some(BufWriter::with_capacity(WRITE_BUFFER_BYTES, file));
                self.state = WriterState::Primary;
                self.bytes_written = size;
            }
            Err(_) => self.open_fallback(),
        }
    }

    fn open_fallback(&mut self) {
        self.file = None;
        let opened = self
            .config
            .fallback_path
            .as_deref()
            .map(|path| (path, open_append(path)));
        match opened {
            Some((path, Ok((file, size)))) => {
                let _ = writeln!(
                    io::stderr(),
                    "[SLV-JSONL] primary log unavailable, using fallback {}",
                    path.display()
                );
                self.file = Some(BufWriter::with_capacity(WRITE_BUFFER_BYTES, file));
                self.state = WriterState::Fallback;
                self.bytes_written = size;
            }
            Some((_, Err(_))) | None => {
                let _ = writeln!(
                    io::stderr(),
                    "[SLV-JSONL] no writable log file, writing activity to stderr"
                );
                self.state = WriterState::Stderr;
            }
        }
    }

    fn step_down(&mut self) {
        self.file = None;
        match self.state {
            WriterState::Primary => self.open_fallback(),
            WriterState::Fallback => {
                let _ = writeln!(io::stderr(), "[SLV-JSONL] fallback write failed, using stderr");
                self.state = WriterState::Stderr;
            }
            WriterState::Stderr | WriterState::Discard => self.state = WriterState::Discard,
        }
    }

    fn rotate(&mut self) {
        self.flush();
        self.file = None;

        let base = match self.state {
            WriterState::Primary => self.config.path.clone(),
            WriterState::Fallback => match &self.config.fallback_path {
                Some(path) => path.clone(),
                None => return,
            },
            WriterState::Stderr | WriterState::Discard => return,
        };

        let keep = self.config.max_rotated_files;
        if keep == 0 {
            let _ = fs::remove_file(&base);
        } else {
            let _ = fs::remove_file(rotated_name(&base, keep));
            for index in (1..keep).rev() {
                let _ = fs::rename(rotated_name(&base, index), rotated_name(&base, index + 1));
            }
            let _ = fs::rename(&base, rotated_name(&base, 1));
        }

        match open_append(&base) {
            Ok((file, _)) => {
                self.file = Some(BufWriter::with_capacity(WRITE_BUFFER_BYTES, file));
                self.bytes_written = 0;
            }
            Err(_) => self.step_down(),
        }
    }
}

fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| SlvError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SlvError::io(path, source))?;
    let size = file.metadata().map_or(0, |meta| meta.len());
    Ok((file, size))
}

/// `activity.jsonl` -> `activity.jsonl.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

fn utc_now_millis() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: PathBuf) -> JsonlConfig {
        JsonlConfig {
            path,
            fallback_path: None,
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 2,
            fsync_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn entries_are_single_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));

        let mut entry = LogEntry::new(EventType::SnapshotMerge, Severity::Info);
        entry.scope = Some("c1/*".to_string());
        entry.new_records = Some(3);
        writer.write_entry(&entry);
        writer.write_entry(&LogEntry::new(EventType::TickSkip, Severity::Info));
        writer.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "snapshot_merge");
        assert_eq!(first["severity"], "info");
        assert_eq!(first["scope"], "c1/*");
        assert_eq!(first["new_records"], 3);
    }

    #[test]
    fn unset_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));
        writer.write_entry(&LogEntry::new(EventType::SessionStart, Severity::Info));
        writer.flush();

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"scope\""));
        assert!(!line.contains("\"watermark\""));
        assert!(line.contains("\"session_start\""));
    }

    #[test]
    fn rotation_keeps_bounded_generations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.jsonl");
        let mut cfg = config(path.clone());
        cfg.max_size_bytes = 80;
        let mut writer = JsonlWriter::open(cfg);

        for _ in 0..12 {
            writer.write_entry(&LogEntry::new(EventType::TickSkip, Severity::Info));
        }
        writer.flush();

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
        assert!(rotated_name(&path, 2).exists());
        assert!(!rotated_name(&path, 3).exists());
    }

    #[test]
    fn unwritable_primary_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.jsonl");
        let mut cfg = config(PathBuf::from("/proc/slv-no-such-dir/activity.jsonl"));
        cfg.fallback_path = Some(fallback.clone());
        let mut writer = JsonlWriter::open(cfg);

        assert_eq!(writer.state(), WriterState::Fallback);
        writer.write_entry(&LogEntry::new(EventType::FetchFailure, Severity::Warning));
        writer.flush();
        assert!(!fs::read_to_string(&fallback).unwrap().is_empty());
    }

    #[test]
    fn no_writable_file_degrades_to_stderr() {
        let writer = JsonlWriter::open(config(PathBuf::from(
            "/proc/slv-no-such-dir/activity.jsonl",
        )));
        assert_eq!(writer.state(), WriterState::Stderr);
        assert_eq!(writer.state().label(), "stderr");
    }
}
