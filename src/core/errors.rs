//! SLV-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::fetch::FetchError;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SlvError>;

/// Top-level error type for the live view client.
#[derive(Debug, Error)]
pub enum SlvError {
    #[error("[SLV-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SLV-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SLV-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SLV-2001] {operation} requires a selected scope: {details}")]
    InvalidScope {
        operation: &'static str,
        details: String,
    },

    #[error("[SLV-2101] fetch failed for {scope}: {source}")]
    Fetch {
        scope: String,
        #[source]
        source: FetchError,
    },

    #[error("[SLV-2102] stale result discarded for {scope} (generation {generation})")]
    StaleResultDiscarded { scope: String, generation: u64 },

    #[error("[SLV-2201] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SLV-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SLV-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[SLV-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SlvError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SLV-1001",
            Self::MissingConfig { .. } => "SLV-1002",
            Self::ConfigParse { .. } => "SLV-1003",
            Self::InvalidScope { .. } => "SLV-2001",
            Self::Fetch { .. } => "SLV-2101",
            Self::StaleResultDiscarded { .. } => "SLV-2102",
            Self::Serialization { .. } => "SLV-2201",
            Self::Io { .. } => "SLV-3002",
            Self::ChannelClosed { .. } => "SLV-3003",
            Self::Runtime { .. } => "SLV-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::Io { .. } | Self::ChannelClosed { .. } | Self::Runtime { .. }
        )
    }

    /// Whether the error should ever reach a user.
    ///
    /// Stale results are an internal classification of late fetch completions.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleResultDiscarded { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Precondition failure for an operation that needs an active scope.
    #[must_use]
    pub fn no_scope(operation: &'static str) -> Self {
        Self::InvalidScope {
            operation,
            details: "no controller selected".to_string(),
        }
    }
}

impl From<serde_json::Error> for SlvError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SlvError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
