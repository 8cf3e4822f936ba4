//! JSON wire shapes served by the sensor API, and their conversion into domain types.

#![allow(missing_docs)]

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fetch::FetchError;
use crate::model::catalog::{Controller, ControllerState, LatestReading, Trial, TrialState};
use crate::model::record::{DataFamily, LogEvent, Payload, Reading, Record};
use crate::model::scope::{ControllerId, TrialId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingWire {
    #[serde(default)]
    pub uuid_lectura: Option<String>,
    pub uuid_controlador: String,
    #[serde(default)]
    pub uuid_ensayo: Option<String>,
    #[serde(default)]
    pub nombre_ensayo: Option<String>,
    pub id_sensor: u8,
    pub lectura_temperatura: f64,
    pub lectura_humedad: f64,
    #[serde(default)]
    pub lectura_bateria: Option<f64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogWire {
    pub id: u64,
    pub fecha: String,
    pub hora: String,
    pub tag: String,
    pub evento: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerWire {
    pub uuid_controlador: String,
    pub nombre_controlador: String,
    #[serde(default = "default_controller_state")]
    pub estado: ControllerState,
    #[serde(default)]
    pub bateria: Option<f64>,
    #[serde(default)]
    pub uuid_ensayo_activo: Option<String>,
    pub timestamp_registro: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialWire {
    pub uuid_ensayo: String,
    pub nombre_ensayo: String,
    #[serde(default)]
    pub uuid_controlador: Option<String>,
    #[serde(default = "default_trial_state")]
    pub estado: TrialState,
    pub timestamp_registro: String,
}

const fn default_controller_state() -> ControllerState {
    ControllerState::Inactive
}

const fn default_trial_state() -> TrialState {
    TrialState::Stopped
}

/// Parse an API timestamp. Offsets are honored; naive values are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|err| FetchError::Decode {
            details: format!("bad timestamp {raw:?}: {err}"),
        })
}

fn log_instant(fecha: &str, hora: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(fecha.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(hora.trim(), "%H:%M:%S%.f").ok()?;
    Some(date.and_time(time).and_utc())
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|value| !value.trim().is_empty())
}

impl ReadingWire {
    pub fn into_record(self) -> Result<Record, FetchError> {
        let at = parse_timestamp(&self.timestamp)?;
        Ok(Record::reading(
            at,
            Some(ControllerId::new(self.uuid_controlador)),
            non_empty(self.uuid_ensayo).map(TrialId::new),
            Reading {
                sensor_id: self.id_sensor,
                trial_name: non_empty(self.nombre_ensayo),
                temperature_c: self.lectura_temperatura,
                humidity_pct: self.lectura_humedad,
                battery_v: self.lectura_bateria,
            },
        ))
    }
}

impl LogWire {
    /// Logs are keyed by id; an unparseable date/time only loses the instant.
    #[must_use]
    pub fn into_record(self) -> Record {
        let occurred_at = log_instant(&self.fecha, &self.hora);
        Record::log(
            self.id,
            occurred_at,
            LogEvent {
                tag: self.tag,
                message: self.evento,
            },
        )
    }
}

impl ControllerWire {
    pub fn into_controller(self) -> Result<Controller, FetchError> {
        Ok(Controller {
            id: ControllerId::new(self.uuid_controlador),
            name: self.nombre_controlador,
            state: self.estado,
            battery_v: self.bateria,
            active_trial: non_empty(self.uuid_ensayo_activo).map(TrialId::new),
            registered_at: parse_timestamp(&self.timestamp_registro)?,
        })
    }
}

impl TrialWire {
    pub fn into_trial(self) -> Result<Trial, FetchError> {
        Ok(Trial {
            id: TrialId::new(self.uuid_ensayo),
            name: self.nombre_ensayo,
            controller: non_empty(self.uuid_controlador).map(ControllerId::new),
            state: self.estado,
            registered_at: parse_timestamp(&self.timestamp_registro)?,
        })
    }
}

// ──────────────────── body decoding ────────────────────

/// Decode a snapshot body (a JSON array) for the given family.
pub fn decode_snapshot(family: DataFamily, body: &[u8]) -> Result<Vec<Record>, FetchError> {
    match family {
        DataFamily::Readings => {
            let rows: Vec<ReadingWire> = serde_json::from_slice(body)?;
            rows.into_iter().map(ReadingWire::into_record).collect()
        }
        DataFamily::Logs => {
            let rows: Vec<LogWire> = serde_json::from_slice(body)?;
            Ok(rows.into_iter().map(LogWire::into_record).collect())
        }
    }
}

pub fn decode_controllers(body: &[u8]) -> Result<Vec<Controller>, FetchError> {
    let rows: Vec<ControllerWire> = serde_json::from_slice(body)?;
    rows.into_iter().map(ControllerWire::into_controller).collect()
}

pub fn decode_trials(body: &[u8]) -> Result<Vec<Trial>, FetchError> {
    let rows: Vec<TrialWire> = serde_json::from_slice(body)?;
    rows.into_iter().map(TrialWire::into_trial).collect()
}

/// The latest-reading endpoint answers `null` when nothing has been recorded.
pub fn decode_latest(body: &[u8]) -> Result<Option<LatestReading>, FetchError> {
    let row: Option<ReadingWire> = serde_json::from_slice(body)?;
    row.map(|wire| {
        let controller = ControllerId::new(wire.uuid_controlador.clone());
        let record = wire.into_record()?;
        match (record.occurred_at, record.payload) {
            (Some(at), Payload::Reading(reading)) => Ok(LatestReading {
                controller,
                at,
                reading,
            }),
            _ => Err(FetchError::Decode {
                details: "latest reading without timestamp".to_string(),
            }),
        }
    })
    .transpose()
}
