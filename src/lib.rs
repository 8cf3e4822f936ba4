#![forbid(unsafe_code)]

//! Sensor Live View (slv): incremental live tables over a polled REST backend.
//!
//! A controller (and optional trial) selects a scope. The active view polls
//! that scope's newest records, diffs each snapshot against a per-scope
//! watermark, and prepends only unseen rows. One poller runs at a time and
//! results from a superseded scope are discarded.
//!
//! # Library usage
//!
//! ```rust,no_run
//! use sensor_live_view::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use sensor_live_view::core::config::Config;
//! use sensor_live_view::sync::session::ViewSession;
//! ```

pub mod prelude;

pub mod core;
pub mod export;
pub mod fetch;
pub mod logger;
pub mod model;
pub mod present;
pub mod runtime;
pub mod sync;
