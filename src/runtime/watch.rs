//! The `slv watch` loop.
//!
//! Drives a [`ViewSession`] until a stop command arrives or the optional run
//! time elapses. Commands come from any number of [`CommandSource`]s (OS
//! signals, keyboard) polled once per iteration.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::core::config::Config;
use crate::core::errors::{Result, SlvError};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::model::record::DataFamily;
use crate::model::scope::Scope;
use crate::present::Presentation;
use crate::sync::session::ViewSession;

pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchCommand {
    Stop,
    Refresh,
    Reload,
    ToggleFamily,
    Export,
}

/// Anything that can hand the watch loop commands without blocking.
pub trait CommandSource {
    fn next_command(&mut self) -> Option<WatchCommand>;
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub scope: Scope,
    pub family: DataFamily,
    /// Stop by itself after this long.
    pub run_for: Option<Duration>,
    pub idle_wait: Duration,
}

impl WatchOptions {
    #[must_use]
    pub fn new(scope: Scope, family: DataFamily) -> Self {
        Self {
            scope,
            family,
            run_for: None,
            idle_wait: DEFAULT_IDLE_WAIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    Elapsed,
}

impl StopReason {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Requested => "stop requested",
            Self::Elapsed => "run time elapsed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSummary {
    pub reason: StopReason,
    pub uptime: Duration,
    pub rows: usize,
    pub exports: Vec<PathBuf>,
}

pub struct WatchRuntime<P: Presentation> {
    config: Config,
    config_path: Option<PathBuf>,
    session: ViewSession<P>,
    logger: ActivityLoggerHandle,
    sources: Vec<Box<dyn CommandSource>>,
    source_label: String,
    exports: Vec<PathBuf>,
}

impl<P: Presentation> WatchRuntime<P> {
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        session: ViewSession<P>,
        logger: ActivityLoggerHandle,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            config,
            config_path,
            session,
            logger,
            sources: Vec::new(),
            source_label: source_label.into(),
            exports: Vec::new(),
        }
    }

    pub fn add_source(&mut self, source: Box<dyn CommandSource>) {
        self.sources.push(source);
    }

    pub fn session(&self) -> &ViewSession<P> {
        &self.session
    }

    /// Run until stopped. The session is shut down before returning.
    pub fn run(&mut self, options: &WatchOptions) -> Result<WatchSummary> {
        let started = Instant::now();
        self.logger.send(ActivityEvent::SessionStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config.stable_hash().unwrap_or_default(),
            source: self.source_label.clone(),
        });

        let outcome = self.run_inner(options, started);
        let rows = self.session.live_view().len();
        self.session.shutdown();

        let uptime = started.elapsed();
        let reason = match &outcome {
            Ok(reason) => reason.label().to_string(),
            Err(err) => {
                self.logger.send(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                format!("error: {err}")
            }
        };
        self.logger.send(ActivityEvent::SessionStopped {
            reason,
            uptime_secs: uptime.as_secs(),
        });

        Ok(WatchSummary {
            reason: outcome?,
            uptime,
            rows,
            exports: std::mem::take(&mut self.exports),
        })
    }

    fn run_inner(&mut self, options: &WatchOptions, started: Instant) -> Result<StopReason> {
        self.session
            .activate_view(options.scope.clone(), options.family, Instant::now())?;
        let deadline = options.run_for.map(|run_for| started + run_for);

        loop {
            for command in self.drain_commands() {
                if command == WatchCommand::Stop {
                    return Ok(StopReason::Requested);
                }
                self.handle(command)?;
            }

            let mut wait = options.idle_wait;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(StopReason::Elapsed);
                }
                wait = wait.min(deadline - now);
            }

            self.session.wait_for_activity(wait)?;
            self.session.pump(Instant::now())?;
        }
    }

    fn drain_commands(&mut self) -> Vec<WatchCommand> {
        let mut commands = Vec::new();
        for source in &mut self.sources {
            while let Some(command) = source.next_command() {
                commands.push(command);
                if command == WatchCommand::Stop {
                    return commands;
                }
            }
        }
        commands
    }

    fn handle(&mut self, command: WatchCommand) -> Result<()> {
        let now = Instant::now();
        match command {
            WatchCommand::Stop => {}
            WatchCommand::Refresh => {
                self.session.refresh_now(now)?;
            }
            WatchCommand::Reload => self.reload_config(now)?,
            WatchCommand::ToggleFamily => {
                let next = match self.session.target().map(|target| target.family) {
                    Some(DataFamily::Readings) => DataFamily::Logs,
                    _ => DataFamily::Readings,
                };
                self.session.switch_family(next, now)?;
            }
            WatchCommand::Export => {
                let dir = self.config.export.output_dir.clone();
                match self.session.export_to_dir(&dir, Local::now().date_naive()) {
                    Ok(path) => {
                        self.session
                            .presentation_mut()
                            .notice(&format!("exported {}", path.display()));
                        self.exports.push(path);
                    }
                    Err(err @ (SlvError::InvalidScope { .. } | SlvError::Io { .. })) => {
                        self.session
                            .presentation_mut()
                            .notice(&format!("export failed: {err}"));
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    fn reload_config(&mut self, now: Instant) -> Result<()> {
        let path = self
            .config_path
            .clone()
            .unwrap_or_else(|| self.config.paths.config_file.clone());

        match Config::load(Some(&path)) {
            Ok(new_config) => {
                let old_hash = self.config.stable_hash().unwrap_or_default();
                let new_hash = new_config.stable_hash().unwrap_or_default();
                if old_hash == new_hash {
                    self.session.presentation_mut().notice("config unchanged");
                    return Ok(());
                }
                let restarted = self.session.reconfigure(&new_config, now)?;
                self.logger.send(ActivityEvent::ConfigReloaded {
                    details: format!("config hash: {old_hash} -> {new_hash}"),
                });
                self.config = new_config;
                self.session.presentation_mut().notice(if restarted {
                    "config reloaded, view restarted"
                } else {
                    "config reloaded"
                });
            }
            Err(err) => {
                self.logger.send(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: format!("config reload failed: {err}"),
                });
                self.session
                    .presentation_mut()
                    .notice(&format!("config reload failed: {err}"));
            }
        }
        Ok(())
    }
}
