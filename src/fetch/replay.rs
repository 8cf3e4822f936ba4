//! Offline fetchers: a JSON file re-read on every tick, and a scripted in-memory source.

#![allow(missing_docs)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::fetch::{FetchError, SnapshotFetcher, SnapshotRequest, wire};
use crate::model::record::Record;
use crate::model::scope::Scope;

/// Whether `record` belongs to `scope`. Records without a controller (logs) always match.
#[must_use]
pub fn in_scope(record: &Record, scope: &Scope) -> bool {
    let Some(controller) = &record.controller_id else {
        return true;
    };
    if *controller != scope.controller {
        return false;
    }
    match &scope.trial {
        Some(trial) => record.trial_id.as_ref() == Some(trial),
        None => true,
    }
}

/// Newest-first page of scoped records, the way the API serves them.
fn page(mut records: Vec<Record>, request: &SnapshotRequest) -> Vec<Record> {
    records.retain(|record| in_scope(record, &request.scope));
    records.sort_by(|a, b| b.key.cmp(&a.key));
    records.truncate(request.limit);
    records
}

// ──────────────────── file replay ────────────────────

/// Serves snapshots from a file in the API's wire format.
///
/// The file is re-read on every fetch, so appending rows simulates new data.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotFetcher for FileFetcher {
    fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Record>, FetchError> {
        let body = fs::read(&self.path).map_err(|err| FetchError::Unavailable {
            details: format!("{}: {err}", self.path.display()),
        })?;
        let records = wire::decode_snapshot(request.family, &body)?;
        Ok(page(records, request))
    }

    fn describe(&self) -> String {
        format!("replay {}", self.path.display())
    }
}

// ──────────────────── scripted source ────────────────────

type Scripted = Result<Vec<Record>, FetchError>;

/// In-memory fetcher that answers from a queue of prepared responses.
///
/// An exhausted script answers with an empty snapshot. An optional gate
/// holds every fetch until the test releases it, to observe in-flight state.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<SnapshotRequest>>,
    gate: Option<Receiver<()>>,
}

impl ScriptedFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gated fetcher; each send on the returned sender releases one fetch.
    #[must_use]
    pub fn gated() -> (Self, Sender<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                gate: Some(rx),
                ..Self::default()
            },
            tx,
        )
    }

    #[must_use]
    pub fn then_ok(self, records: Vec<Record>) -> Self {
        self.push(Ok(records));
        self
    }

    #[must_use]
    pub fn then_err(self, err: FetchError) -> Self {
        self.push(Err(err));
        self
    }

    pub fn push(&self, response: Scripted) {
        self.script.lock().push_back(response);
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<SnapshotRequest> {
        self.seen.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl SnapshotFetcher for ScriptedFetcher {
    fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Record>, FetchError> {
        self.seen.lock().push(request.clone());
        if let Some(gate) = &self.gate
            && gate.recv().is_err()
        {
            return Err(FetchError::Unavailable {
                details: "gate closed".to_string(),
            });
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(Vec::new()))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::{DataFamily, Reading, SequenceKey};
    use crate::model::scope::{ControllerId, TrialId};
    use chrono::{TimeZone, Utc};

    fn reading(controller: &str, trial: Option<&str>, second: u32) -> Record {
        Record::reading(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, second).unwrap(),
            Some(ControllerId::from(controller)),
            trial.map(TrialId::from),
            Reading {
                sensor_id: 1,
                trial_name: None,
                temperature_c: 20.0,
                humidity_pct: 40.0,
                battery_v: None,
            },
        )
    }

    #[test]
    fn scope_filter_respects_trial() {
        let scope = Scope::with_trial("c1", "t1");
        assert!(in_scope(&reading("c1", Some("t1"), 0), &scope));
        assert!(!in_scope(&reading("c1", Some("t2"), 0), &scope));
        assert!(!in_scope(&reading("c2", Some("t1"), 0), &scope));
        assert!(in_scope(
            &reading("c1", Some("t2"), 0),
            &Scope::controller("c1")
        ));
    }

    #[test]
    fn file_fetcher_pages_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readings.json");
        fs::write(
            &path,
            r#"[
              {"uuid_controlador": "c1", "id_sensor": 1, "lectura_temperatura": 20.0,
               "lectura_humedad": 40.0, "timestamp": "2025-06-01T12:00:01Z"},
              {"uuid_controlador": "c1", "id_sensor": 1, "lectura_temperatura": 21.0,
               "lectura_humedad": 41.0, "timestamp": "2025-06-01T12:00:03Z"},
              {"uuid_controlador": "c2", "id_sensor": 1, "lectura_temperatura": 22.0,
               "lectura_humedad": 42.0, "timestamp": "2025-06-01T12:00:05Z"},
              {"uuid_controlador": "c1", "id_sensor": 2, "lectura_temperatura": 23.0,
               "lectura_humedad": 43.0, "timestamp": "2025-06-01T12:00:02Z"}
            ]"#,
        )
        .unwrap();

        let fetcher = FileFetcher::new(&path);
        let records = fetcher
            .fetch(&SnapshotRequest {
                scope: Scope::controller("c1"),
                family: DataFamily::Readings,
                limit: 2,
            })
            .unwrap();

        let seconds: Vec<SequenceKey> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(
            seconds,
            vec![
                SequenceKey::Timestamp(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 3).unwrap()),
                SequenceKey::Timestamp(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 2).unwrap()),
            ]
        );
    }

    #[test]
    fn missing_replay_file_is_unavailable() {
        let fetcher = FileFetcher::new("/nonexistent/slv/replay.json");
        let err = fetcher
            .fetch(&SnapshotRequest {
                scope: Scope::controller("c1"),
                family: DataFamily::Logs,
                limit: 10,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }

    #[test]
    fn scripted_fetcher_plays_in_order_then_empties() {
        let fetcher = ScriptedFetcher::new()
            .then_err(FetchError::Transport {
                details: "down".to_string(),
            })
            .then_ok(vec![reading("c1", None, 1)]);
        let request = SnapshotRequest {
            scope: Scope::controller("c1"),
            family: DataFamily::Readings,
            limit: 10,
        };

        assert!(fetcher.fetch(&request).is_err());
        assert_eq!(fetcher.fetch(&request).unwrap().len(), 1);
        assert!(fetcher.fetch(&request).unwrap().is_empty());
        assert_eq!(fetcher.requests().len(), 3);
    }
}
