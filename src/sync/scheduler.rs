//! Poll scheduler: one active polling loop, generation-tagged fetches, one fetch worker.
//!
//! The owner drives the loop by calling [`PollScheduler::poll_due`] with the
//! current instant. Due ticks are handed to a background `slv-fetcher` thread
//! over a bounded crossbeam channel; completions come back on a second channel
//! and are classified by [`PollScheduler::settle`].
//!
//! Every activation bumps the generation. A completion whose generation is no
//! longer live is stale and must not touch the view. Queued jobs of a dead
//! generation are dropped by the worker before they run, or purged by the
//! scheduler when they would crowd out a live job.

#![allow(missing_docs)]

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded, unbounded};

use crate::core::errors::{Result, SlvError};
use crate::fetch::{FetchError, SnapshotFetcher, SnapshotRequest};
use crate::model::record::{DataFamily, Record};
use crate::model::scope::Scope;

// ──────────────────── channel capacities ────────────────────

/// Scheduler → worker. Holds the in-flight job plus cancelled jobs awaiting drop.
/// A full queue is purged of cancelled jobs before a live job is refused.
const REQUEST_CHANNEL_CAP: usize = 8;

/// Generation value meaning "no live loop".
const NO_GENERATION: u64 = 0;

// ──────────────────── public types ────────────────────

/// What an active loop polls: a scope and the data family shown for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewTarget {
    pub scope: Scope,
    pub family: DataFamily,
}

impl ViewTarget {
    #[must_use]
    pub const fn new(scope: Scope, family: DataFamily) -> Self {
        Self { scope, family }
    }
}

impl fmt::Display for ViewTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.scope, self.family)
    }
}

/// Tag carried by every dispatched fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub scope: Scope,
    pub family: DataFamily,
    pub generation: u64,
    pub tick: u64,
}

/// A finished fetch returned by the worker.
#[derive(Debug)]
pub struct Completion {
    pub ticket: FetchTicket,
    pub result: std::result::Result<Vec<Record>, FetchError>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// Loop started from idle.
    Started { generation: u64 },
    /// A loop for another target was cancelled first.
    Restarted {
        previous: ViewTarget,
        generation: u64,
    },
    /// Already polling this exact target; nothing changed.
    AlreadyActive { generation: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The previous fetch has not completed.
    InFlight,
    /// The worker queue was full.
    Backlog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    Idle,
    NotDue { next_due: Instant },
    Dispatched(FetchTicket),
    Skipped(SkipReason),
}

#[derive(Debug)]
pub enum Settlement {
    /// Belongs to the live loop and its outstanding fetch.
    Current(Completion),
    /// Issued under a cancelled generation; discard.
    Stale(Completion),
}

/// Read-only view of the active loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopStatus {
    pub target: ViewTarget,
    pub interval: Duration,
    pub generation: u64,
    pub next_due: Instant,
    pub in_flight: Option<FetchTicket>,
    pub ticks: u64,
    pub skipped: u64,
    pub consecutive_failures: u32,
}

// ──────────────────── scheduler ────────────────────

struct FetchJob {
    ticket: FetchTicket,
    request: SnapshotRequest,
}

pub struct PollScheduler {
    active: Option<LoopStatus>,
    generation_counter: u64,
    live_generation: Arc<AtomicU64>,
    limit: usize,
    requests: Option<Sender<FetchJob>>,
    /// Scheduler-side handle on the request queue, used to purge cancelled jobs.
    backlog: Receiver<FetchJob>,
    completions: Receiver<Completion>,
    worker: Option<thread::JoinHandle<()>>,
}

impl PollScheduler {
    /// Spawn the fetch worker. `limit` is the page size of every snapshot request.
    pub fn spawn(fetcher: Arc<dyn SnapshotFetcher>, limit: usize) -> Result<Self> {
        let (request_tx, request_rx) = bounded::<FetchJob>(REQUEST_CHANNEL_CAP);
        let request_rx_purge = request_rx.clone();
        let (completion_tx, completion_rx) = unbounded::<Completion>();
        let live_generation = Arc::new(AtomicU64::new(NO_GENERATION));
        let worker_generation = Arc::clone(&live_generation);

        let worker = thread::Builder::new()
            .name("slv-fetcher".to_string())
            .spawn(move || {
                fetch_worker_main(
                    &request_rx,
                    &completion_tx,
                    fetcher.as_ref(),
                    &worker_generation,
                );
            })
            .map_err(|source| SlvError::Runtime {
                details: format!("failed to spawn fetch worker: {source}"),
            })?;

        Ok(Self {
            active: None,
            generation_counter: NO_GENERATION,
            live_generation,
            limit,
            requests: Some(request_tx),
            backlog: request_rx_purge,
            completions: completion_rx,
            worker: Some(worker),
        })
    }

    #[must_use]
    pub fn status(&self) -> Option<&LoopStatus> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start polling `target`, cancelling any loop for a different target.
    ///
    /// A fresh loop dispatches its first fetch immediately.
    pub fn activate(
        &mut self,
        target: ViewTarget,
        interval: Duration,
        now: Instant,
    ) -> Result<Activation> {
        if let Some(current) = &self.active
            && current.target == target
        {
            return Ok(Activation::AlreadyActive {
                generation: current.generation,
            });
        }

        let previous = self.deactivate().map(|(target, _)| target);
        self.generation_counter += 1;
        let generation = self.generation_counter;
        self.live_generation.store(generation, Ordering::Release);
        self.active = Some(LoopStatus {
            target,
            interval,
            generation,
            next_due: now + interval,
            in_flight: None,
            ticks: 0,
            skipped: 0,
            consecutive_failures: 0,
        });
        self.dispatch()?;

        Ok(match previous {
            Some(previous) => Activation::Restarted {
                previous,
                generation,
            },
            None => Activation::Started { generation },
        })
    }

    /// Cancel the active loop. Returns what was cancelled; idle is a no-op.
    pub fn deactivate(&mut self) -> Option<(ViewTarget, u64)> {
        let cancelled = self.active.take()?;
        self.live_generation.store(NO_GENERATION, Ordering::Release);
        Some((cancelled.target, cancelled.generation))
    }

    /// Fire the tick if it is due. Overlapping ticks are skipped, never queued.
    pub fn poll_due(&mut self, now: Instant) -> Result<TickDecision> {
        let Some(state) = self.active.as_mut() else {
            return Ok(TickDecision::Idle);
        };
        if now < state.next_due {
            return Ok(TickDecision::NotDue {
                next_due: state.next_due,
            });
        }

        state.next_due += state.interval;
        if state.next_due <= now {
            state.next_due = now + state.interval;
        }

        if state.in_flight.is_some() {
            state.skipped += 1;
            return Ok(TickDecision::Skipped(SkipReason::InFlight));
        }
        self.dispatch()
    }

    /// Fetch now, outside the schedule, unless a fetch is already outstanding.
    ///
    /// The next scheduled tick moves to one full interval from `now`.
    pub fn request_now(&mut self, now: Instant) -> Result<TickDecision> {
        let Some(state) = self.active.as_mut() else {
            return Ok(TickDecision::Idle);
        };
        if state.in_flight.is_some() {
            state.skipped += 1;
            return Ok(TickDecision::Skipped(SkipReason::InFlight));
        }
        state.next_due = now + state.interval;
        self.dispatch()
    }

    /// Classify a completion against the live generation.
    pub fn settle(&mut self, completion: Completion) -> Settlement {
        let Some(state) = self.active.as_mut() else {
            return Settlement::Stale(completion);
        };
        let outstanding = state
            .in_flight
            .as_ref()
            .is_some_and(|ticket| *ticket == completion.ticket);
        if completion.ticket.generation != state.generation || !outstanding {
            return Settlement::Stale(completion);
        }

        state.in_flight = None;
        if completion.result.is_ok() {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        }
        Settlement::Current(completion)
    }

    pub fn try_completion(&self) -> Option<Completion> {
        self.completions.try_recv().ok()
    }

    /// Block up to `timeout` for the next completion.
    pub fn wait_completion(&self, timeout: Duration) -> Result<Option<Completion>> {
        match self.completions.recv_timeout(timeout) {
            Ok(completion) => Ok(Some(completion)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SlvError::ChannelClosed {
                component: "fetch worker",
            }),
        }
    }

    /// Stop the worker and wait for it. An in-progress fetch finishes first.
    pub fn shutdown(&mut self) {
        self.deactivate();
        self.requests = None;
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            eprintln!("[SLV-SYNC] fetch worker panicked during shutdown");
        }
    }

    fn dispatch(&mut self) -> Result<TickDecision> {
        let Some(state) = self.active.as_mut() else {
            return Ok(TickDecision::Idle);
        };
        let Some(requests) = &self.requests else {
            return Err(SlvError::ChannelClosed {
                component: "fetch worker",
            });
        };

        let ticket = FetchTicket {
            scope: state.target.scope.clone(),
            family: state.target.family,
            generation: state.generation,
            tick: state.ticks + 1,
        };
        let job = FetchJob {
            ticket: ticket.clone(),
            request: SnapshotRequest {
                scope: state.target.scope.clone(),
                family: state.target.family,
                limit: self.limit,
            },
        };

        let sent = match requests.try_send(job) {
            Err(TrySendError::Full(job)) => {
                let purged = purge_cancelled(&self.backlog, requests, state.generation);
                if purged > 0 {
                    eprintln!(
                        "[SLV-SYNC] purged {purged} cancelled fetch job(s) from a full queue"
                    );
                }
                requests.try_send(job)
            }
            other => other,
        };

        match sent {
            Ok(()) => {
                state.ticks += 1;
                state.in_flight = Some(ticket.clone());
                Ok(TickDecision::Dispatched(ticket))
            }
            Err(TrySendError::Full(_)) => {
                state.skipped += 1;
                eprintln!("[SLV-SYNC] fetch queue full, tick deferred");
                Ok(TickDecision::Skipped(SkipReason::Backlog))
            }
            Err(TrySendError::Disconnected(_)) => Err(SlvError::ChannelClosed {
                component: "fetch worker",
            }),
        }
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        // Closing the queue lets the worker exit once its current fetch returns.
        self.live_generation.store(NO_GENERATION, Ordering::Release);
        self.requests = None;
    }
}

/// Drop queued jobs whose generation is not `live`; returns how many were dropped.
///
/// Live jobs taken off the queue are put back in their original order.
fn purge_cancelled(
    backlog: &Receiver<FetchJob>,
    requests: &Sender<FetchJob>,
    live: u64,
) -> usize {
    let mut kept = Vec::new();
    let mut purged = 0;
    while let Ok(job) = backlog.try_recv() {
        if job.ticket.generation == live {
            kept.push(job);
        } else {
            purged += 1;
        }
    }
    for job in kept {
        if requests.try_send(job).is_err() {
            eprintln!("[SLV-SYNC] live fetch job lost while purging the queue");
        }
    }
    purged
}

// ──────────────────── worker thread ────────────────────

fn fetch_worker_main(
    requests: &Receiver<FetchJob>,
    completions: &Sender<Completion>,
    fetcher: &dyn SnapshotFetcher,
    live_generation: &AtomicU64,
) {
    while let Ok(job) = requests.recv() {
        if job.ticket.generation != live_generation.load(Ordering::Acquire) {
            continue;
        }
        let started = Instant::now();
        let result = fetcher.fetch(&job.request);
        let completion = Completion {
            ticket: job.ticket,
            result,
            elapsed: started.elapsed(),
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
}
