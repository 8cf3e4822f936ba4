//! Signal handling for `slv watch`: SIGTERM/SIGINT stop, SIGHUP config
//! reload, SIGUSR1 immediate refresh.
//!
//! Uses `signal-hook` flag registration. The watch loop polls the flags each
//! iteration instead of blocking on signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::runtime::watch::{CommandSource, WatchCommand};

/// Flags shared between the OS signal hooks and the watch loop.
#[derive(Clone)]
pub struct ControlSignals {
    stop_flag: Arc<AtomicBool>,
    reload_flag: Arc<AtomicBool>,
    refresh_flag: Arc<AtomicBool>,
}

impl ControlSignals {
    /// Create the flags and register OS hooks. Registration failures are
    /// reported on stderr and otherwise ignored.
    #[must_use]
    pub fn install() -> Self {
        let signals = Self::unregistered();
        signals.register();
        signals
    }

    /// Flags with no OS hooks attached; driven only through `request_*`.
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            stop_flag: Arc::new(AtomicBool::new(false)),
            reload_flag: Arc::new(AtomicBool::new(false)),
            refresh_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_stop(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }

    /// Check and clear.
    pub fn should_reload(&self) -> bool {
        self.reload_flag.swap(false, Ordering::Relaxed)
    }

    /// Check and clear.
    pub fn should_refresh(&self) -> bool {
        self.refresh_flag.swap(false, Ordering::Relaxed)
    }

    pub fn request_stop(&self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_reload(&self) {
        self.reload_flag.store(true, Ordering::Relaxed);
    }

    pub fn request_refresh(&self) {
        self.refresh_flag.store(true, Ordering::Relaxed);
    }

    fn register(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.stop_flag)) {
            eprintln!("[SLV-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.stop_flag)) {
            eprintln!("[SLV-SIGNAL] failed to register SIGINT: {e}");
        }

        #[cfg(unix)]
        {
            use signal_hook::consts::{SIGHUP, SIGUSR1};
            if let Err(e) = signal_hook::flag::register(SIGHUP, Arc::clone(&self.reload_flag)) {
                eprintln!("[SLV-SIGNAL] failed to register SIGHUP: {e}");
            }
            if let Err(e) = signal_hook::flag::register(SIGUSR1, Arc::clone(&self.refresh_flag)) {
                eprintln!("[SLV-SIGNAL] failed to register SIGUSR1: {e}");
            }
        }
    }
}

impl CommandSource for ControlSignals {
    fn next_command(&mut self) -> Option<WatchCommand> {
        if self.should_stop() {
            Some(WatchCommand::Stop)
        } else if self.should_reload() {
            Some(WatchCommand::Reload)
        } else if self.should_refresh() {
            Some(WatchCommand::Refresh)
        } else {
            None
        }
    }
}
