//! Snapshot fetcher contract: the engine's only view of the remote data source.

#![allow(missing_docs)]

pub mod http;
pub mod replay;
pub mod wire;

use thiserror::Error;

use crate::model::record::{DataFamily, Record};
use crate::model::scope::Scope;

/// Transport or backend failure. Always recoverable; the next tick retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport failure: {details}")]
    Transport { details: String },

    #[error("backend returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("undecodable response: {details}")]
    Decode { details: String },

    #[error("source unavailable: {details}")]
    Unavailable { details: String },
}

impl FetchError {
    /// Short machine-friendly kind, used in activity-log events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Decode { .. } => "decode",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode {
            details: value.to_string(),
        }
    }
}

/// One read of the newest records for a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub scope: Scope,
    pub family: DataFamily,
    /// Page size; the backend serves newest first.
    pub limit: usize,
}

/// Source of snapshots. Implementations perform no retries of their own.
///
/// Fetches run on the scheduler's worker thread, hence `Send + Sync`.
pub trait SnapshotFetcher: Send + Sync {
    fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Record>, FetchError>;

    /// Human-readable source description for diagnostics.
    fn describe(&self) -> String {
        "snapshot source".to_string()
    }
}

impl<T: SnapshotFetcher + ?Sized> SnapshotFetcher for std::sync::Arc<T> {
    fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Record>, FetchError> {
        (**self).fetch(request)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
