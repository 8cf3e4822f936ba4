//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SlvError};
use crate::model::record::DataFamily;
use crate::present::format::DisplayClock;

/// Full client configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub display: DisplayConfig,
    pub export: ExportConfig,
    pub paths: PathsConfig,
}

/// Remote API location and endpoint layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    /// Bearer token forwarded verbatim; authentication itself is the server's concern.
    pub auth_token: Option<String>,
    /// Page size requested per snapshot (the API serves newest-first).
    pub snapshot_limit: usize,
    pub readings_path: String,
    pub logs_path: String,
    pub controllers_path: String,
    pub trials_path: String,
    pub latest_path: String,
}

/// Poll cadence and fresh-marker durations per data family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    pub readings_interval_ms: u64,
    pub logs_interval_ms: u64,
    pub readings_fresh_ms: u64,
    pub logs_fresh_ms: u64,
}

/// Date/time display settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DisplayConfig {
    /// Fixed UTC offset for display; unset means the local timezone.
    pub utc_offset_minutes: Option<i32>,
}

/// Export destination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
}

/// Filesystem paths used by slv.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub activity_log: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            timeout_ms: 5_000,
            auth_token: None,
            snapshot_limit: 100,
            readings_path: "/sensor/".to_string(),
            logs_path: "/logs/".to_string(),
            controllers_path: "/controladores/".to_string(),
            trials_path: "/ensayos/".to_string(),
            latest_path: "/sensor/latest".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            readings_interval_ms: 10_000,
            logs_interval_ms: 1_000,
            readings_fresh_ms: 3_000,
            logs_fresh_ms: 5_000,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[SLV-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("slv").join("config.toml"),
            activity_log: home_dir
                .join(".local")
                .join("share")
                .join("slv")
                .join("activity.jsonl"),
        }
    }
}

impl ApiConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Endpoint path serving snapshots of the given family.
    #[must_use]
    pub fn snapshot_path(&self, family: DataFamily) -> &str {
        match family {
            DataFamily::Readings => &self.readings_path,
            DataFamily::Logs => &self.logs_path,
        }
    }
}

impl PollingConfig {
    #[must_use]
    pub fn interval_for(&self, family: DataFamily) -> Duration {
        Duration::from_millis(match family {
            DataFamily::Readings => self.readings_interval_ms,
            DataFamily::Logs => self.logs_interval_ms,
        })
    }

    #[must_use]
    pub fn fresh_for(&self, family: DataFamily) -> Duration {
        Duration::from_millis(match family {
            DataFamily::Readings => self.readings_fresh_ms,
            DataFamily::Logs => self.logs_fresh_ms,
        })
    }
}

impl DisplayConfig {
    #[must_use]
    pub fn clock(&self) -> DisplayClock {
        self.utc_offset_minutes
            .and_then(|minutes| DisplayClock::fixed_minutes(minutes).ok())
            .unwrap_or(DisplayClock::Local)
    }
}

const MIN_INTERVAL_MS: u64 = 100;
const MAX_SNAPSHOT_LIMIT: usize = 1_000;
const MAX_OFFSET_MINUTES: i32 = 18 * 60;
const BASE_URL_PATTERN: &str = r"^https?://[^\s/?#]+(/[^\s?#]*)?$";

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SlvError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(SlvError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a keeps the value stable across processes and Rust releases.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SLV_API_BASE_URL") {
            self.api.base_url = raw;
        }
        if let Some(raw) = lookup("SLV_API_TIMEOUT_MS") {
            self.api.timeout_ms = parse_env("SLV_API_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("SLV_API_TOKEN") {
            self.api.auth_token = Some(raw);
        }
        if let Some(raw) = lookup("SLV_API_SNAPSHOT_LIMIT") {
            self.api.snapshot_limit = parse_env("SLV_API_SNAPSHOT_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("SLV_POLL_READINGS_INTERVAL_MS") {
            self.polling.readings_interval_ms = parse_env("SLV_POLL_READINGS_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("SLV_POLL_LOGS_INTERVAL_MS") {
            self.polling.logs_interval_ms = parse_env("SLV_POLL_LOGS_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("SLV_DISPLAY_UTC_OFFSET_MINUTES") {
            self.display.utc_offset_minutes =
                Some(parse_env("SLV_DISPLAY_UTC_OFFSET_MINUTES", &raw)?);
        }
        if let Some(raw) = lookup("SLV_EXPORT_OUTPUT_DIR") {
            self.export.output_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SLV_ACTIVITY_LOG") {
            self.paths.activity_log = PathBuf::from(raw);
        }
        Ok(())
    }

    fn normalize(&mut self) {
        while self.api.base_url.len() > "http://".len() && self.api.base_url.ends_with('/') {
            self.api.base_url.pop();
        }
        for path in [
            &mut self.api.readings_path,
            &mut self.api.logs_path,
            &mut self.api.controllers_path,
            &mut self.api.trials_path,
            &mut self.api.latest_path,
        ] {
            if !path.starts_with('/') {
                path.insert(0, '/');
            }
        }
        self.api.auth_token = self
            .api
            .auth_token
            .take()
            .filter(|token| !token.trim().is_empty());
    }

    fn validate(&self) -> Result<()> {
        validate_base_url(&self.api.base_url)?;

        if self.api.timeout_ms == 0 {
            return Err(SlvError::InvalidConfig {
                details: "api.timeout_ms must be > 0".to_string(),
            });
        }

        if !(1..=MAX_SNAPSHOT_LIMIT).contains(&self.api.snapshot_limit) {
            return Err(SlvError::InvalidConfig {
                details: format!(
                    "api.snapshot_limit must be in [1, {MAX_SNAPSHOT_LIMIT}], got {}",
                    self.api.snapshot_limit
                ),
            });
        }

        for (name, val) in [
            ("readings_interval_ms", self.polling.readings_interval_ms),
            ("logs_interval_ms", self.polling.logs_interval_ms),
        ] {
            if val < MIN_INTERVAL_MS {
                return Err(SlvError::InvalidConfig {
                    details: format!("polling.{name} must be >= {MIN_INTERVAL_MS}, got {val}"),
                });
            }
        }

        if self.polling.readings_fresh_ms == 0 || self.polling.logs_fresh_ms == 0 {
            return Err(SlvError::InvalidConfig {
                details: "polling fresh-marker durations must be > 0".to_string(),
            });
        }

        if let Some(offset) = self.display.utc_offset_minutes
            && !(-MAX_OFFSET_MINUTES..=MAX_OFFSET_MINUTES).contains(&offset)
        {
            return Err(SlvError::InvalidConfig {
                details: format!(
                    "display.utc_offset_minutes must be within ±{MAX_OFFSET_MINUTES}, got {offset}"
                ),
            });
        }

        Ok(())
    }
}

fn validate_base_url(url: &str) -> Result<()> {
    let pattern = Regex::new(BASE_URL_PATTERN).map_err(|err| SlvError::InvalidConfig {
        details: format!("base_url pattern failed to compile: {err}"),
    })?;
    if !pattern.is_match(url) {
        return Err(SlvError::InvalidConfig {
            details: format!("api.base_url must start with http:// or https://, got {url:?}"),
        });
    }
    Ok(())
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| SlvError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
