//! HTTP client for the sensor API, driven through a `curl` subprocess.

#![allow(missing_docs)]

use std::process::Command;
use std::time::Duration;

use crate::core::config::ApiConfig;
use crate::fetch::{FetchError, SnapshotFetcher, SnapshotRequest, wire};
use crate::model::catalog::{Controller, LatestReading, Trial};
use crate::model::record::{DataFamily, Record};
use crate::model::scope::ControllerId;

const BODY_EXCERPT_CHARS: usize = 200;

/// Read-only client for snapshot, catalog, and quick-status endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    api: ApiConfig,
}

impl ApiClient {
    #[must_use]
    pub fn new(api: ApiConfig) -> Self {
        Self { api }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.api.base_url
    }

    pub fn controllers(&self) -> Result<Vec<Controller>, FetchError> {
        let query = [("limit", self.api.snapshot_limit.to_string())];
        let body = self.get(&self.api.controllers_path, &query)?;
        wire::decode_controllers(&body)
    }

    pub fn trials(&self, controller: &ControllerId) -> Result<Vec<Trial>, FetchError> {
        let query = [
            ("uuid_controlador", controller.to_string()),
            ("limit", self.api.snapshot_limit.to_string()),
        ];
        let body = self.get(&self.api.trials_path, &query)?;
        wire::decode_trials(&body)
    }

    pub fn latest(&self) -> Result<Option<LatestReading>, FetchError> {
        let body = self.get(&self.api.latest_path, &[])?;
        wire::decode_latest(&body)
    }

    /// Query parameters for one snapshot request.
    #[must_use]
    pub fn snapshot_query(request: &SnapshotRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![("uuid_controlador", request.scope.controller.to_string())];
        if request.family == DataFamily::Readings
            && let Some(trial) = &request.scope.trial
        {
            query.push(("uuid_ensayo", trial.to_string()));
        }
        query.push(("limit", request.limit.to_string()));
        query
    }

    /// Full argument vector handed to curl (without the program name).
    #[must_use]
    pub fn curl_args(&self, path: &str, query: &[(&str, String)]) -> Vec<String> {
        let mut args = vec![
            "--silent".to_string(),
            "--show-error".to_string(),
            "--max-time".to_string(),
            timeout_secs(self.api.timeout()),
            "--header".to_string(),
            "Accept: application/json".to_string(),
            "--write-out".to_string(),
            "\n%{http_code}".to_string(),
        ];
        if let Some(token) = &self.api.auth_token {
            args.push("--header".to_string());
            args.push(format!("Authorization: Bearer {token}"));
        }
        if !query.is_empty() {
            args.push("--get".to_string());
            for (key, value) in query {
                args.push("--data-urlencode".to_string());
                args.push(format!("{key}={value}"));
            }
        }
        args.push(format!("{}{path}", self.api.base_url));
        args
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>, FetchError> {
        let output = Command::new("curl")
            .args(self.curl_args(path, query))
            .output()
            .map_err(|err| FetchError::Unavailable {
                details: format!("curl not found or failed to start: {err}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Transport {
                details: format!("curl exited with {}: {}", output.status, stderr.trim()),
            });
        }

        split_status(output.stdout)
    }
}

impl SnapshotFetcher for ApiClient {
    fn fetch(&self, request: &SnapshotRequest) -> Result<Vec<Record>, FetchError> {
        let query = Self::snapshot_query(request);
        let body = self.get(self.api.snapshot_path(request.family), &query)?;
        wire::decode_snapshot(request.family, &body)
    }

    fn describe(&self) -> String {
        format!("api {}", self.api.base_url)
    }
}

fn timeout_secs(timeout: Duration) -> String {
    format!("{:.3}", timeout.as_secs_f64())
}

/// Separate the body from the trailing status line written by `--write-out`.
fn split_status(mut stdout: Vec<u8>) -> Result<Vec<u8>, FetchError> {
    let Some(newline) = memchr::memrchr(b'\n', &stdout) else {
        return Err(FetchError::Decode {
            details: "response lacks status trailer".to_string(),
        });
    };
    let code_raw = String::from_utf8_lossy(&stdout[newline + 1..]).trim().to_string();
    stdout.truncate(newline);

    let code: u16 = code_raw.parse().map_err(|_| FetchError::Decode {
        details: format!("unparseable status trailer {code_raw:?}"),
    })?;

    match code {
        0 => Err(FetchError::Transport {
            details: "no HTTP response received".to_string(),
        }),
        200..=299 => Ok(stdout),
        _ => {
            let body: String = String::from_utf8_lossy(&stdout)
                .chars()
                .take(BODY_EXCERPT_CHARS)
                .collect();
            Err(FetchError::Status { code, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scope::Scope;

    fn client() -> ApiClient {
        ApiClient::new(ApiConfig::default())
    }

    #[test]
    fn readings_query_carries_trial_filter_and_limit() {
        let request = SnapshotRequest {
            scope: Scope::with_trial("c1", "t9"),
            family: DataFamily::Readings,
            limit: 50,
        };
        let query = ApiClient::snapshot_query(&request);
        assert_eq!(
            query,
            vec![
                ("uuid_controlador", "c1".to_string()),
                ("uuid_ensayo", "t9".to_string()),
                ("limit", "50".to_string()),
            ]
        );
    }

    #[test]
    fn logs_query_ignores_trial_filter() {
        let request = SnapshotRequest {
            scope: Scope::with_trial("c1", "t9"),
            family: DataFamily::Logs,
            limit: 100,
        };
        let query = ApiClient::snapshot_query(&request);
        assert!(query.iter().all(|(key, _)| *key != "uuid_ensayo"));
    }

    #[test]
    fn curl_args_encode_query_and_url() {
        let args = client().curl_args("/sensor/", &[("uuid_controlador", "c 1".to_string())]);
        assert!(args.contains(&"--get".to_string()));
        assert!(args.contains(&"uuid_controlador=c 1".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("http://127.0.0.1:8000/api/sensor/")
        );
        assert!(!args.iter().any(|arg| arg.starts_with("Authorization")));
    }

    #[test]
    fn curl_args_forward_bearer_token() {
        let mut api = ApiConfig::default();
        api.auth_token = Some("abc".to_string());
        let args = ApiClient::new(api).curl_args("/sensor/latest", &[]);
        assert!(args.contains(&"Authorization: Bearer abc".to_string()));
        assert!(!args.contains(&"--get".to_string()));
    }

    #[test]
    fn status_trailer_is_split_from_body() {
        let body = split_status(b"[]\n200".to_vec()).unwrap();
        assert_eq!(body, b"[]");
    }

    #[test]
    fn error_status_becomes_status_error() {
        let err = split_status(b"{\"detail\":\"nope\"}\n404".to_vec()).unwrap_err();
        assert_eq!(
            err,
            FetchError::Status {
                code: 404,
                body: "{\"detail\":\"nope\"}".to_string()
            }
        );
    }

    #[test]
    fn zero_status_is_transport_error() {
        let err = split_status(b"\n000".to_vec()).unwrap_err();
        assert_eq!(err.kind(), "transport");
    }
}
