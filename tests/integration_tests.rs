//! Integration tests: CLI smoke tests and end-to-end view session scenarios
//! over file-backed snapshots.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use sensor_live_view::core::config::Config;
use sensor_live_view::fetch::replay::FileFetcher;
use sensor_live_view::logger::activity::ActivityLoggerHandle;
use sensor_live_view::model::record::{DataFamily, SequenceKey};
use sensor_live_view::model::scope::{ControllerId, Scope};
use sensor_live_view::present::NullPresentation;
use sensor_live_view::sync::diff::ViewStatus;
use sensor_live_view::sync::session::ViewSession;

// ──────────────────── CLI smoke ────────────────────

#[test]
fn help_command_prints_usage() {
    let result = common::run_cli_case("help_command_prints_usage", &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: slv [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn version_command_prints_version() {
    let result = common::run_cli_case("version_command_prints_version", &["--version"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains(env!("CARGO_PKG_VERSION")),
        "log: {}",
        result.log_path.display()
    );
}

#[test]
fn config_validate_reports_hash() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_config(dir.path(), "");
    let result = common::run_cli_case(
        "config_validate_reports_hash",
        &["--json", "--config", config.to_str().unwrap(), "config", "validate"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["valid"], true);
    assert!(payload["hash"].as_str().is_some_and(|hash| !hash.is_empty()));
}

#[test]
fn config_show_summarises_polling_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_config(dir.path(), "\n[polling]\nlogs_interval_ms = 2500\n");
    let result = common::run_cli_case_with_env(
        "config_show_summarises_polling_cadence",
        &["--config", config.to_str().unwrap(), "config", "show"],
        &[("SLV_OUTPUT_FORMAT", "human")],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(
        result.stdout.contains("logs     every 2500 ms"),
        "log: {}",
        result.log_path.display()
    );
    assert!(result.stdout.contains("api      http://127.0.0.1:9/api"));
}

#[test]
fn config_validate_rejects_non_http_base_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[api]\nbase_url = \"ftp://example.org\"\n").unwrap();
    let result = common::run_cli_case(
        "config_validate_rejects_non_http_base_url",
        &["--json", "--config", path.to_str().unwrap(), "config", "validate"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["valid"], false);
    assert_eq!(payload["code"], "SLV-1001");
}

#[test]
fn controllers_against_unreachable_backend_is_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_config(dir.path(), "");
    let result = common::run_cli_case(
        "controllers_against_unreachable_backend",
        &["--config", config.to_str().unwrap(), "controllers"],
    );
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("SLV-2101"), "log: {}", result.log_path.display());
}

#[test]
fn export_from_replay_writes_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_config(dir.path(), "");
    let replay = common::write_log_replay(dir.path(), &[1, 3, 5]);
    let out_dir = dir.path().join("exports");

    let result = common::run_cli_case(
        "export_from_replay_writes_csv_file",
        &[
            "--json",
            "--config",
            config.to_str().unwrap(),
            "export",
            "c1",
            "--logs",
            "--replay",
            replay.to_str().unwrap(),
            "--output-dir",
            out_dir.to_str().unwrap(),
        ],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let payload: Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["rows"], 3);
    let path = payload["path"].as_str().unwrap();
    assert!(
        Path::new(path)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("logs_c1_all_")
    );

    let csv = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "ID,Date,Time,Tag,Event");
    assert!(lines[1].starts_with("5,"));
    assert!(lines[3].starts_with("1,"));
}

#[test]
fn export_to_stdout_streams_csv() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_config(dir.path(), "");
    let replay = common::write_log_replay(dir.path(), &[2]);
    let result = common::run_cli_case(
        "export_to_stdout_streams_csv",
        &[
            "--config",
            config.to_str().unwrap(),
            "export",
            "c1",
            "--logs",
            "--replay",
            replay.to_str().unwrap(),
            "--stdout",
        ],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(
        result.stdout,
        "ID,Date,Time,Tag,Event\n2,\"Sun, 01 Jun 2025\",12:00:02 PM,SYS,event 2\n"
    );
}

#[test]
fn export_of_empty_view_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_config(dir.path(), "");
    let replay = common::write_log_replay(dir.path(), &[]);
    let result = common::run_cli_case(
        "export_of_empty_view_is_refused",
        &[
            "--config",
            config.to_str().unwrap(),
            "export",
            "c1",
            "--logs",
            "--replay",
            replay.to_str().unwrap(),
            "--stdout",
        ],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("SLV-2001"), "log: {}", result.log_path.display());
    assert!(result.stdout.is_empty());
}

#[test]
fn watch_replay_streams_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::write_config(dir.path(), "");
    let replay = common::write_log_replay(dir.path(), &[1, 2, 3]);
    let result = common::run_cli_case(
        "watch_replay_streams_json_lines",
        &[
            "--json",
            "--config",
            config.to_str().unwrap(),
            "watch",
            "c1",
            "--logs",
            "--replay",
            replay.to_str().unwrap(),
            "--for-secs",
            "1",
        ],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let records: Vec<Value> = result
        .stdout
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).unwrap())
        .filter(|value| value.get("key").is_some())
        .collect();
    assert_eq!(records.len(), 3, "log: {}", result.log_path.display());
    assert_eq!(records[0]["key"], 3);
}

// ──────────────────── session scenarios ────────────────────

fn session(path: &Path) -> ViewSession<NullPresentation> {
    let (logger, _events) = ActivityLoggerHandle::detached();
    ViewSession::new(
        &Config::default(),
        Arc::new(FileFetcher::new(path)),
        NullPresentation,
        logger,
    )
    .unwrap()
}

fn settle(session: &mut ViewSession<NullPresentation>) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if session.wait_for_activity(Duration::from_millis(50)).unwrap() {
            return;
        }
    }
    panic!("no completion applied within 5s");
}

fn keys(session: &ViewSession<NullPresentation>) -> Vec<SequenceKey> {
    session
        .live_view()
        .records()
        .map(|record| record.key.clone())
        .collect()
}

fn write_readings(path: &Path, rows: &[(&str, u32)]) {
    let body: Vec<Value> = rows
        .iter()
        .map(|(controller, minute)| {
            serde_json::json!({
                "uuid_controlador": controller,
                "id_sensor": 1,
                "lectura_temperatura": 20.5,
                "lectura_humedad": 41.0,
                "timestamp": format!("2025-06-01T10:{minute:02}:00Z"),
            })
        })
        .collect();
    fs::write(path, serde_json::to_string(&body).unwrap()).unwrap();
}

#[test]
fn appended_log_lines_arrive_as_one_increment() {
    let dir = tempfile::tempdir().unwrap();
    let replay = common::write_log_replay(dir.path(), &[1, 3, 5]);
    let mut session = session(&replay);

    session
        .activate_view(Scope::controller("c1"), DataFamily::Logs, Instant::now())
        .unwrap();
    settle(&mut session);
    assert_eq!(
        keys(&session),
        vec![SequenceKey::Id(5), SequenceKey::Id(3), SequenceKey::Id(1)]
    );

    common::write_log_replay(dir.path(), &[1, 3, 5, 7]);
    session.refresh_now(Instant::now()).unwrap();
    settle(&mut session);
    assert_eq!(
        keys(&session),
        vec![
            SequenceKey::Id(7),
            SequenceKey::Id(5),
            SequenceKey::Id(3),
            SequenceKey::Id(1)
        ]
    );
    assert!(session.live_view().rows()[0].fresh_until.is_some());
    assert!(session.live_view().rows()[1].fresh_until.is_none());
    assert_eq!(session.watermark(), Some(&SequenceKey::Id(7)));
    session.shutdown();
}

#[test]
fn switching_controller_shows_only_the_new_scope() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readings.json");
    write_readings(&path, &[("c1", 1), ("c2", 2), ("c1", 3), ("c2", 4)]);
    let mut session = session(&path);

    session
        .activate_view(Scope::controller("c1"), DataFamily::Readings, Instant::now())
        .unwrap();
    settle(&mut session);
    assert_eq!(session.live_view().len(), 2);
    assert!(
        session
            .live_view()
            .records()
            .all(|record| record.controller_id == Some(ControllerId::from("c1")))
    );

    session
        .select_controller(ControllerId::from("c2"), Instant::now())
        .unwrap();
    assert!(session.live_view().is_empty());
    settle(&mut session);
    assert_eq!(session.live_view().len(), 2);
    assert!(
        session
            .live_view()
            .records()
            .all(|record| record.controller_id == Some(ControllerId::from("c2")))
    );
    session.shutdown();
}

#[test]
fn missing_source_errors_then_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.json");
    let mut session = session(&path);

    session
        .activate_view(Scope::controller("c1"), DataFamily::Logs, Instant::now())
        .unwrap();
    settle(&mut session);
    for expected in 2..=3_u32 {
        session.refresh_now(Instant::now()).unwrap();
        settle(&mut session);
        assert!(matches!(
            session.status(),
            ViewStatus::Error { consecutive_failures, .. } if *consecutive_failures == expected
        ));
        assert!(session.live_view().is_empty());
    }

    fs::rename(common::write_log_replay(dir.path(), &[4, 2]), &path).unwrap();
    session.refresh_now(Instant::now()).unwrap();
    settle(&mut session);
    assert_eq!(session.status(), &ViewStatus::Live);
    assert_eq!(keys(&session), vec![SequenceKey::Id(4), SequenceKey::Id(2)]);
    session.shutdown();
}
