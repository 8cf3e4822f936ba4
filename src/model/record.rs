//! Telemetry records: readings and event logs keyed by a totally ordered sequence key.

#![allow(missing_docs)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::scope::{ControllerId, TrialId};

/// Which stream a view displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFamily {
    /// Sensor measurements, keyed by ISO-8601 timestamp.
    Readings,
    /// Controller event logs, keyed by integer id.
    Logs,
}

impl DataFamily {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Readings => "readings",
            Self::Logs => "logs",
        }
    }
}

impl fmt::Display for DataFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Strictly monotonic position of a record within its stream.
///
/// Each data family uses exactly one variant, so comparisons across variants
/// never happen in practice; the derived order is still total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SequenceKey {
    Id(u64),
    Timestamp(DateTime<Utc>),
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Timestamp(ts) => {
                f.write_str(&ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
            }
        }
    }
}

/// One sensor measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor_id: u8,
    pub trial_name: Option<String>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub battery_v: Option<f64>,
}

/// One controller log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub tag: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Reading(Reading),
    Log(LogEvent),
}

/// An immutable telemetry entry as fetched from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: SequenceKey,
    pub controller_id: Option<ControllerId>,
    pub trial_id: Option<TrialId>,
    /// Wall-clock instant of the measurement or event, when known.
    pub occurred_at: Option<DateTime<Utc>>,
    pub payload: Payload,
}

impl Record {
    #[must_use]
    pub fn reading(
        at: DateTime<Utc>,
        controller_id: Option<ControllerId>,
        trial_id: Option<TrialId>,
        reading: Reading,
    ) -> Self {
        Self {
            key: SequenceKey::Timestamp(at),
            controller_id,
            trial_id,
            occurred_at: Some(at),
            payload: Payload::Reading(reading),
        }
    }

    #[must_use]
    pub fn log(id: u64, occurred_at: Option<DateTime<Utc>>, event: LogEvent) -> Self {
        Self {
            key: SequenceKey::Id(id),
            controller_id: None,
            trial_id: None,
            occurred_at,
            payload: Payload::Log(event),
        }
    }

    #[must_use]
    pub const fn family(&self) -> DataFamily {
        match self.payload {
            Payload::Reading(_) => DataFamily::Readings,
            Payload::Log(_) => DataFamily::Logs,
        }
    }
}
