//! Activity logger thread.
//!
//! A dedicated `slv-logger` thread owns the [`JsonlWriter`]. Everything else
//! holds an [`ActivityLoggerHandle`] and sends [`ActivityEvent`]s over a
//! bounded crossbeam channel with `try_send`, so a slow disk never stalls the
//! sync loop; overflow is counted and reported in the log itself.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SlvError};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

/// Events recorded in the activity log.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    SessionStarted {
        version: String,
        config_hash: String,
        source: String,
    },
    SessionStopped {
        reason: String,
        uptime_secs: u64,
    },
    ViewActivated {
        scope: String,
        family: String,
        generation: u64,
        interval_ms: u64,
    },
    ViewDeactivated {
        scope: String,
        generation: u64,
    },
    ScopeChanged {
        from: Option<String>,
        to: Option<String>,
    },
    SnapshotMerged {
        scope: String,
        tick: u64,
        new_records: usize,
        rows: usize,
        watermark: Option<String>,
        duration_ms: u64,
    },
    FetchFailed {
        scope: String,
        tick: u64,
        kind: String,
        message: String,
        consecutive_failures: u32,
    },
    TickSkipped {
        scope: String,
        skipped_total: u64,
    },
    StaleResultDiscarded {
        scope: String,
        generation: u64,
    },
    ExportWritten {
        scope: String,
        path: String,
        rows: usize,
    },
    ConfigReloaded {
        details: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Ends the logger thread after a final flush.
    Shutdown,
}

/// Cloneable, non-blocking sender side of the activity log.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Queue an event. A full channel drops it and bumps the drop counter.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }

    /// A handle whose events go nowhere, plus the receiver for inspection.
    ///
    /// Used where no logger thread runs (one-shot commands, tests).
    #[must_use]
    pub fn detached() -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        (
            Self {
                tx,
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }
}

/// Spawn the logger thread writing to `config`.
pub fn spawn_logger(
    config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let join = thread::Builder::new()
        .name("slv-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped))
        .map_err(|err| SlvError::Runtime {
            details: format!("failed to spawn logger thread: {err}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{lost} activity events dropped under back-pressure"));
            jsonl.write_entry(&warn);
        }

        if event == ActivityEvent::Shutdown {
            break;
        }
        jsonl.write_entry(&to_log_entry(&event));
    }

    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

#[allow(clippy::too_many_lines)]
fn to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SessionStarted {
            version,
            config_hash,
            source,
        } => {
            let mut e = LogEntry::new(EventType::SessionStart, Severity::Info);
            e.details = Some(format!(
                "version={version} config_hash={config_hash} source={source}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SessionStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::SessionStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ViewActivated {
            scope,
            family,
            generation,
            interval_ms,
        } => {
            let mut e = LogEntry::new(EventType::ViewActivate, Severity::Info);
            e.scope = Some(scope.clone());
            e.family = Some(family.clone());
            e.generation = Some(*generation);
            e.details = Some(format!("interval_ms={interval_ms}"));
            e
        }
        ActivityEvent::ViewDeactivated { scope, generation } => {
            let mut e = LogEntry::new(EventType::ViewDeactivate, Severity::Info);
            e.scope = Some(scope.clone());
            e.generation = Some(*generation);
            e
        }
        ActivityEvent::ScopeChanged { from, to } => {
            let mut e = LogEntry::new(EventType::ScopeChange, Severity::Info);
            e.scope = to.clone();
            e.details = Some(format!(
                "from={}",
                from.as_deref().unwrap_or("none")
            ));
            e
        }
        ActivityEvent::SnapshotMerged {
            scope,
            tick,
            new_records,
            rows,
            watermark,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::SnapshotMerge, Severity::Info);
            e.scope = Some(scope.clone());
            e.tick = Some(*tick);
            e.new_records = Some(*new_records);
            e.rows = Some(*rows);
            e.watermark = watermark.clone();
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::FetchFailed {
            scope,
            tick,
            kind,
            message,
            consecutive_failures,
        } => {
            let mut e = LogEntry::new(EventType::FetchFailure, Severity::Warning);
            e.scope = Some(scope.clone());
            e.tick = Some(*tick);
            e.ok = Some(false);
            e.error_code = Some(kind.clone());
            e.error_message = Some(message.clone());
            e.details = Some(format!("consecutive_failures={consecutive_failures}"));
            e
        }
        ActivityEvent::TickSkipped {
            scope,
            skipped_total,
        } => {
            let mut e = LogEntry::new(EventType::TickSkip, Severity::Info);
            e.scope = Some(scope.clone());
            e.details = Some(format!("skipped_total={skipped_total}"));
            e
        }
        ActivityEvent::StaleResultDiscarded { scope, generation } => {
            let mut e = LogEntry::new(EventType::StaleDiscard, Severity::Info);
            e.scope = Some(scope.clone());
            e.generation = Some(*generation);
            e
        }
        ActivityEvent::ExportWritten { scope, path, rows } => {
            let mut e = LogEntry::new(EventType::ExportWrite, Severity::Info);
            e.scope = Some(scope.clone());
            e.path = Some(path.clone());
            e.rows = Some(*rows);
            e.ok = Some(true);
            e
        }
        ActivityEvent::ConfigReloaded { details } => {
            let mut e = LogEntry::new(EventType::ConfigReload, Severity::Info);
            e.details = Some(details.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::SessionStop, Severity::Info),
    }
}
