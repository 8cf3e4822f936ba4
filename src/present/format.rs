//! Pure date/time and measurement display functions.

#![allow(missing_docs)]

use chrono::{DateTime, FixedOffset, Local, Offset, SecondsFormat, Utc};

use crate::core::errors::{Result, SlvError};

const DATE_FORMAT: &str = "%a, %d %b %Y";
const TIME_FORMAT: &str = "%I:%M:%S %p";

/// Timezone used to display instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayClock {
    /// The host's local timezone.
    Local,
    Fixed(FixedOffset),
}

impl DisplayClock {
    pub fn fixed_minutes(minutes: i32) -> Result<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::Fixed)
            .ok_or_else(|| SlvError::InvalidConfig {
                details: format!("utc offset of {minutes} minutes is out of range"),
            })
    }

    #[must_use]
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// `Sun, 01 Jun 2025`
    #[must_use]
    pub fn format_date(&self, at: DateTime<Utc>) -> String {
        self.render(at, DATE_FORMAT)
    }

    /// `03:04:05 PM`
    #[must_use]
    pub fn format_time(&self, at: DateTime<Utc>) -> String {
        self.render(at, TIME_FORMAT)
    }

    fn render(&self, at: DateTime<Utc>, pattern: &str) -> String {
        match self {
            Self::Local => at.with_timezone(&Local).format(pattern).to_string(),
            Self::Fixed(offset) => at.with_timezone(offset).format(pattern).to_string(),
        }
    }
}

/// Canonical machine-readable form of an instant.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Measurements display with two decimals.
#[must_use]
pub fn format_measurement(value: f64) -> String {
    format!("{value:.2}")
}
