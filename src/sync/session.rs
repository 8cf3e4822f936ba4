//! `ViewSession`: the single owner of scope, watermark, live view, and poller state.
//!
//! UI code talks only to this type. It selects scopes, activates and
//! deactivates the view, drives the poll loop through [`ViewSession::pump`],
//! and exports what is on screen. Fetch failures never escape: they become an
//! error status plus a `render_error` call while polling continues.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use crossbeam_channel::Receiver;

use crate::core::config::{Config, PollingConfig};
use crate::core::errors::{Result, SlvError};
use crate::export::csv;
use crate::fetch::SnapshotFetcher;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::model::record::{DataFamily, SequenceKey};
use crate::model::scope::{ControllerId, Scope, ScopeChange, ScopeResolver, TrialId};
use crate::present::Presentation;
use crate::present::format::DisplayClock;
use crate::sync::diff::{LiveView, ViewStatus, diff_snapshot};
use crate::sync::scheduler::{
    Activation, Completion, LoopStatus, PollScheduler, Settlement, TickDecision, ViewTarget,
};
use crate::sync::watermark::WatermarkTracker;

/// What one completion did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Merged { inserted: usize },
    Failed { consecutive_failures: u32 },
}

/// Summary of one [`ViewSession::pump`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub inserted: usize,
    pub failures: usize,
    pub stale: usize,
    pub tick: Option<TickDecision>,
    pub expired: usize,
}

pub struct ViewSession<P: Presentation> {
    resolver: ScopeResolver,
    tracker: WatermarkTracker,
    view: LiveView,
    scheduler: PollScheduler,
    presentation: P,
    logger: ActivityLoggerHandle,
    polling: PollingConfig,
    clock: DisplayClock,
    interval_override: Option<Duration>,
    target: Option<ViewTarget>,
    status: ViewStatus,
}

impl<P: Presentation> ViewSession<P> {
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn SnapshotFetcher>,
        presentation: P,
        logger: ActivityLoggerHandle,
    ) -> Result<Self> {
        Ok(Self {
            resolver: ScopeResolver::new(),
            tracker: WatermarkTracker::new(),
            view: LiveView::new(),
            scheduler: PollScheduler::spawn(fetcher, config.api.snapshot_limit)?,
            presentation,
            logger,
            polling: config.polling.clone(),
            clock: config.display.clock(),
            interval_override: None,
            target: None,
            status: ViewStatus::Inactive,
        })
    }

    /// Poll every family at `interval` instead of the configured cadence.
    pub fn set_interval_override(&mut self, interval: Option<Duration>) {
        self.interval_override = interval;
    }

    // ──────────────────── accessors ────────────────────

    #[must_use]
    pub fn live_view(&self) -> &LiveView {
        &self.view
    }

    #[must_use]
    pub fn status(&self) -> &ViewStatus {
        &self.status
    }

    #[must_use]
    pub fn active_scope(&self) -> Option<&Scope> {
        self.resolver.active()
    }

    #[must_use]
    pub fn target(&self) -> Option<&ViewTarget> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn loop_status(&self) -> Option<&LoopStatus> {
        self.scheduler.status()
    }

    /// Watermark of the active scope, `None` before any data.
    #[must_use]
    pub fn watermark(&self) -> Option<&SequenceKey> {
        self.resolver.active().and_then(|scope| self.tracker.get(scope))
    }

    #[must_use]
    pub fn clock(&self) -> DisplayClock {
        self.clock
    }

    pub fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    /// Observe scope changes without owning scope state.
    pub fn subscribe(&mut self) -> Receiver<ScopeChange> {
        self.resolver.subscribe()
    }

    // ──────────────────── scope selection ────────────────────

    /// Select a controller; the trial filter resets to all trials.
    pub fn select_controller(&mut self, controller: ControllerId, now: Instant) -> Result<ScopeChange> {
        let change = self.resolver.select_controller(controller);
        self.follow_scope_change(&change, now)?;
        Ok(change)
    }

    /// Narrow or widen the trial filter. Fails without a selected controller.
    pub fn select_trial_filter(&mut self, trial: Option<TrialId>, now: Instant) -> Result<ScopeChange> {
        let change = self.resolver.select_trial_filter(trial)?;
        self.follow_scope_change(&change, now)?;
        Ok(change)
    }

    // ──────────────────── view lifecycle ────────────────────

    /// Show `family` for `scope` and start polling it.
    pub fn activate_view(&mut self, scope: Scope, family: DataFamily, now: Instant) -> Result<Activation> {
        let change = self.resolver.select_scope(scope.clone());
        self.announce(&change);
        if change.identity_changed()
            && let Some(previous) = &change.previous
        {
            self.tracker.reset(previous);
        }
        self.start(ViewTarget::new(scope, family), now)
    }

    /// Switch the data family shown for the active scope.
    pub fn switch_family(&mut self, family: DataFamily, now: Instant) -> Result<Activation> {
        let Some(scope) = self.resolver.active().cloned() else {
            return Err(SlvError::no_scope("switch_family"));
        };
        self.start(ViewTarget::new(scope, family), now)
    }

    /// Hide the view: cancel polling and discard watermark and rows. Idempotent.
    pub fn deactivate_view(&mut self) -> bool {
        let Some(target) = self.target.take() else {
            return false;
        };
        if let Some((_, generation)) = self.scheduler.deactivate() {
            self.logger.send(ActivityEvent::ViewDeactivated {
                scope: target.scope.to_string(),
                generation,
            });
        }
        self.tracker.reset(&target.scope);
        self.view.clear();
        self.status = ViewStatus::Inactive;
        true
    }

    /// Fetch immediately unless a fetch is already outstanding.
    pub fn refresh_now(&mut self, now: Instant) -> Result<TickDecision> {
        if self.target.is_none() {
            return Err(SlvError::no_scope("refresh"));
        }
        let decision = self.scheduler.request_now(now)?;
        self.note_skip(&decision);
        Ok(decision)
    }

    // ──────────────────── driving the loop ────────────────────

    /// Apply finished fetches, fire a due tick, and expire fresh markers.
    pub fn pump(&mut self, now: Instant) -> Result<PumpReport> {
        let mut report = PumpReport::default();

        while let Some(completion) = self.scheduler.try_completion() {
            self.absorb(completion, now, &mut report)?;
        }

        let decision = self.scheduler.poll_due(now)?;
        self.note_skip(&decision);
        report.tick = Some(decision);
        report.expired = self.expire_fresh(now).len();
        Ok(report)
    }

    /// Block until a fetch completes, the next tick is due, a fresh marker
    /// expires, or `timeout` passes. Returns whether a completion was applied.
    pub fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut wait = timeout;
        if let Some(status) = self.scheduler.status() {
            wait = wait.min(status.next_due.saturating_duration_since(now));
        }
        if let Some(deadline) = self.view.next_fresh_deadline() {
            wait = wait.min(deadline.saturating_duration_since(now));
        }

        match self.scheduler.wait_completion(wait)? {
            Some(completion) => {
                let mut report = PumpReport::default();
                self.absorb(completion, Instant::now(), &mut report)?;
                Ok(report.stale == 0)
            }
            None => Ok(false),
        }
    }

    /// Clear expired fresh markers and tell the presentation which rows changed.
    pub fn expire_fresh(&mut self, now: Instant) -> Vec<SequenceKey> {
        let expired = self.view.expire_fresh(now);
        if !expired.is_empty() {
            self.presentation.fresh_expired(&self.view, &expired);
        }
        expired
    }

    // ──────────────────── export ────────────────────

    /// CSV of exactly the rows on screen, in on-screen order.
    pub fn export_current_view(&self) -> Result<String> {
        let Some(target) = &self.target else {
            return Err(SlvError::no_scope("export"));
        };
        if self.view.is_empty() {
            return Err(SlvError::InvalidScope {
                operation: "export",
                details: format!("no rows displayed for {target}"),
            });
        }
        Ok(csv::to_csv(target.family, self.view.records(), &self.clock))
    }

    /// Export into `dir` under the conventional file name for `date`.
    pub fn export_to_dir(&self, dir: &Path, date: NaiveDate) -> Result<PathBuf> {
        let contents = self.export_current_view()?;
        let Some(target) = &self.target else {
            return Err(SlvError::no_scope("export"));
        };
        let name = csv::export_file_name(target.family, &target.scope, date);
        let path = csv::write_export(dir, &name, &contents)?;
        self.logger.send(ActivityEvent::ExportWritten {
            scope: target.scope.to_string(),
            path: path.display().to_string(),
            rows: self.view.len(),
        });
        Ok(path)
    }

    /// Apply reloaded polling and display settings. An active loop whose
    /// interval changed restarts from an empty view.
    pub fn reconfigure(&mut self, config: &Config, now: Instant) -> Result<bool> {
        self.clock = config.display.clock();
        let previous = std::mem::replace(&mut self.polling, config.polling.clone());
        let Some(target) = self.target.clone() else {
            return Ok(false);
        };
        if self.interval_override.is_some()
            || previous.interval_for(target.family) == self.polling.interval_for(target.family)
        {
            return Ok(false);
        }
        self.scheduler.deactivate();
        self.target = None;
        self.start(target, now)?;
        Ok(true)
    }

    /// Stop polling and join the fetch worker.
    pub fn shutdown(&mut self) {
        self.deactivate_view();
        self.scheduler.shutdown();
    }

    // ──────────────────── internals ────────────────────

    fn announce(&mut self, change: &ScopeChange) {
        self.presentation.scope_changed(change);
        self.logger.send(ActivityEvent::ScopeChanged {
            from: change.previous.as_ref().map(ToString::to_string),
            to: change.current.as_ref().map(ToString::to_string),
        });
    }

    fn follow_scope_change(&mut self, change: &ScopeChange, now: Instant) -> Result<()> {
        self.announce(change);
        if !change.identity_changed() {
            return Ok(());
        }
        if let Some(previous) = &change.previous {
            self.tracker.reset(previous);
        }

        match (&change.current, self.target.as_ref().map(|target| target.family)) {
            (Some(scope), Some(family)) => {
                self.start(ViewTarget::new(scope.clone(), family), now)?;
            }
            (Some(scope), None) => self.tracker.reset(scope),
            (None, _) => {
                self.deactivate_view();
            }
        }
        Ok(())
    }

    fn start(&mut self, target: ViewTarget, now: Instant) -> Result<Activation> {
        let interval = self
            .interval_override
            .unwrap_or_else(|| self.polling.interval_for(target.family));
        let activation = self.scheduler.activate(target.clone(), interval, now)?;

        match &activation {
            Activation::AlreadyActive { .. } => {}
            Activation::Started { generation } | Activation::Restarted { generation, .. } => {
                if let Activation::Restarted { previous, .. } = &activation {
                    self.tracker.reset(&previous.scope);
                    self.logger.send(ActivityEvent::ViewDeactivated {
                        scope: previous.scope.to_string(),
                        generation: generation.saturating_sub(1),
                    });
                }
                self.tracker.reset(&target.scope);
                self.view.clear();
                self.status = ViewStatus::Loading;
                self.logger.send(ActivityEvent::ViewActivated {
                    scope: target.scope.to_string(),
                    family: target.family.to_string(),
                    generation: *generation,
                    interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
                });
                self.target = Some(target);
            }
        }
        Ok(activation)
    }

    fn absorb(&mut self, completion: Completion, now: Instant, report: &mut PumpReport) -> Result<()> {
        match self.apply(completion, now) {
            Ok(Applied::Merged { inserted }) => report.inserted += inserted,
            Ok(Applied::Failed { .. }) => report.failures += 1,
            Err(SlvError::StaleResultDiscarded { scope, generation }) => {
                self.logger
                    .send(ActivityEvent::StaleResultDiscarded { scope, generation });
                report.stale += 1;
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    fn apply(&mut self, completion: Completion, now: Instant) -> Result<Applied> {
        let completion = match self.scheduler.settle(completion) {
            Settlement::Current(completion) => completion,
            Settlement::Stale(completion) => {
                return Err(SlvError::StaleResultDiscarded {
                    scope: completion.ticket.scope.to_string(),
                    generation: completion.ticket.generation,
                });
            }
        };
        let Some(target) = self.target.clone() else {
            return Err(SlvError::StaleResultDiscarded {
                scope: completion.ticket.scope.to_string(),
                generation: completion.ticket.generation,
            });
        };
        let tick = completion.ticket.tick;

        let records = match completion.result {
            Ok(records) => records,
            Err(err) => {
                let consecutive_failures = self
                    .scheduler
                    .status()
                    .map_or(1, |status| status.consecutive_failures);
                self.status = ViewStatus::Error {
                    message: err.to_string(),
                    consecutive_failures,
                };
                self.presentation
                    .render_error(&target, &err, consecutive_failures);
                self.logger.send(ActivityEvent::FetchFailed {
                    scope: target.scope.to_string(),
                    tick,
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                    consecutive_failures,
                });
                return Ok(Applied::Failed {
                    consecutive_failures,
                });
            }
        };

        let was_empty = self.view.is_empty();
        let diff = diff_snapshot(records, self.tracker.get(&target.scope));
        if let Some(next) = diff.next_watermark.clone() {
            self.tracker.advance(&target.scope, next);
        }
        let inserted = self
            .view
            .merge(diff, now, self.polling.fresh_for(target.family));

        if self.view.is_empty() {
            self.status = ViewStatus::Empty;
            self.presentation.render_empty(&target);
        } else {
            self.status = ViewStatus::Live;
            if was_empty {
                self.presentation.render_snapshot(&target, &self.view);
            } else if !inserted.is_empty() {
                self.presentation.render_new(&target, &self.view, &inserted);
            }
        }

        self.logger.send(ActivityEvent::SnapshotMerged {
            scope: target.scope.to_string(),
            tick,
            new_records: inserted.len(),
            rows: self.view.len(),
            watermark: self.tracker.get(&target.scope).map(ToString::to_string),
            duration_ms: u64::try_from(completion.elapsed.as_millis()).unwrap_or(u64::MAX),
        });
        Ok(Applied::Merged {
            inserted: inserted.len(),
        })
    }

    fn note_skip(&self, decision: &TickDecision) {
        if let (TickDecision::Skipped(_), Some(status)) = (decision, self.scheduler.status()) {
            self.logger.send(ActivityEvent::TickSkipped {
                scope: status.target.scope.to_string(),
                skipped_total: status.skipped,
            });
        }
    }
}

impl<P: Presentation> Drop for ViewSession<P> {
    fn drop(&mut self) {
        self.scheduler.deactivate();
    }
}
