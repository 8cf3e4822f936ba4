//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use sensor_live_view::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SlvError};

// Model
pub use crate::model::catalog::{Controller, LatestReading, LinkStatus, Trial};
pub use crate::model::record::{DataFamily, LogEvent, Payload, Reading, Record, SequenceKey};
pub use crate::model::scope::{ControllerId, Scope, ScopeChange, ScopeResolver, TrialId};

// Fetch
pub use crate::fetch::http::ApiClient;
pub use crate::fetch::replay::{FileFetcher, ScriptedFetcher};
pub use crate::fetch::{FetchError, SnapshotFetcher, SnapshotRequest};

// Sync
pub use crate::sync::diff::{LiveView, SnapshotDiff, ViewStatus, diff_snapshot};
pub use crate::sync::scheduler::{Activation, PollScheduler, TickDecision, ViewTarget};
pub use crate::sync::session::ViewSession;
pub use crate::sync::watermark::WatermarkTracker;

// Presentation and export
pub use crate::export::csv::{export_file_name, to_csv};
pub use crate::present::format::DisplayClock;
pub use crate::present::{NullPresentation, Presentation};

// Logging
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
