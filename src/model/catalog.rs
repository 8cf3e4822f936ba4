//! Listing entities: controllers, trials, and the latest-reading quick status.

#![allow(missing_docs)]

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::record::Reading;
use crate::model::scope::{ControllerId, TrialId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    #[serde(rename = "Inactivo")]
    Inactive,
    #[serde(rename = "Activo")]
    Active,
    #[serde(rename = "En ensayo")]
    InTrial,
}

impl ControllerState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::InTrial => "in trial",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    Default,
    #[serde(rename = "Parado")]
    Stopped,
    #[serde(rename = "Corriendo")]
    Running,
    #[serde(rename = "Finalizado")]
    Finished,
}

impl TrialState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    pub id: ControllerId,
    pub name: String,
    pub state: ControllerState,
    pub battery_v: Option<f64>,
    pub active_trial: Option<TrialId>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: TrialId,
    pub name: String,
    pub controller: Option<ControllerId>,
    pub state: TrialState,
    pub registered_at: DateTime<Utc>,
}

/// Most recent reading across all controllers, as served by the quick-status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReading {
    pub controller: ControllerId,
    pub at: DateTime<Utc>,
    pub reading: Reading,
}

/// Quick status derived from whether any reading exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Inactive,
}

impl LinkStatus {
    #[must_use]
    pub const fn from_latest(latest: Option<&LatestReading>) -> Self {
        if latest.is_some() {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
        })
    }
}
