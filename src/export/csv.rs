//! CSV rendering of the displayed view.
//!
//! Fields containing a comma, quote, or line break are wrapped in quotes with
//! inner quotes doubled. Rows end with `\n`.

#![allow(missing_docs)]

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::core::errors::{Result, SlvError};
use crate::model::record::{DataFamily, Payload, Record};
use crate::model::scope::Scope;
use crate::present::format::{DisplayClock, format_timestamp};

pub const READING_COLUMNS: [&str; 7] = [
    "Timestamp",
    "Date",
    "Time",
    "Sensor",
    "Trial",
    "Temperature (°C)",
    "Humidity (%)",
];

pub const LOG_COLUMNS: [&str; 5] = ["ID", "Date", "Time", "Tag", "Event"];

#[must_use]
pub const fn columns(family: DataFamily) -> &'static [&'static str] {
    match family {
        DataFamily::Readings => &READING_COLUMNS,
        DataFamily::Logs => &LOG_COLUMNS,
    }
}

#[must_use]
pub fn needs_quoting(field: &str) -> bool {
    let bytes = field.as_bytes();
    memchr::memchr3(b',', b'"', b'\n', bytes).is_some() || memchr::memchr(b'\r', bytes).is_some()
}

#[must_use]
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if needs_quoting(field) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Unescaped field values for one record, in column order.
#[must_use]
pub fn record_fields(record: &Record, clock: &DisplayClock) -> Vec<String> {
    let date = record
        .occurred_at
        .map(|at| clock.format_date(at))
        .unwrap_or_default();
    let time = record
        .occurred_at
        .map(|at| clock.format_time(at))
        .unwrap_or_default();

    match &record.payload {
        Payload::Reading(reading) => vec![
            record.occurred_at.map(format_timestamp).unwrap_or_default(),
            date,
            time,
            reading.sensor_id.to_string(),
            reading.trial_name.clone().unwrap_or_default(),
            reading.temperature_c.to_string(),
            reading.humidity_pct.to_string(),
        ],
        Payload::Log(event) => vec![
            record.key.to_string(),
            date,
            time,
            event.tag.clone(),
            event.message.clone(),
        ],
    }
}

fn push_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field.as_ref()));
    }
    out.push('\n');
}

/// Header plus one row per record, in the order given.
#[must_use]
pub fn to_csv<'a>(
    family: DataFamily,
    records: impl IntoIterator<Item = &'a Record>,
    clock: &DisplayClock,
) -> String {
    let mut out = String::new();
    push_row(&mut out, columns(family));
    for record in records {
        push_row(&mut out, record_fields(record, clock).as_slice());
    }
    out
}

/// `readings_<controller>_<trial|all>_<YYYY-MM-DD>.csv`
#[must_use]
pub fn export_file_name(family: DataFamily, scope: &Scope, date: NaiveDate) -> String {
    let trial = scope
        .trial
        .as_ref()
        .map_or_else(|| "all".to_string(), |trial| file_safe(trial.as_str()));
    format!(
        "{}_{}_{}_{}.csv",
        family.label(),
        file_safe(scope.controller.as_str()),
        trial,
        date.format("%Y-%m-%d")
    )
}

fn file_safe(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write `contents` to `dir/name`, creating `dir` if needed.
pub fn write_export(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|source| SlvError::io(dir, source))?;
    let path = dir.join(name);
    fs::write(&path, contents).map_err(|source| SlvError::io(&path, source))?;
    Ok(path)
}
