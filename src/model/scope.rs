//! Controller/trial scope hierarchy and the resolver that owns the active scope.

#![allow(missing_docs)]

use std::fmt;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SlvError};

const OBSERVER_CHANNEL_CAPACITY: usize = 64;

/// Stable identifier of a controller device.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(String);

/// Stable identifier of a trial run by a controller.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            #[must_use]
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(ControllerId);
string_id!(TrialId);

/// What is being viewed: a controller and an optional trial filter.
///
/// `trial == None` means every trial under the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub controller: ControllerId,
    pub trial: Option<TrialId>,
}

impl Scope {
    #[must_use]
    pub fn controller(controller: impl Into<ControllerId>) -> Self {
        Self {
            controller: controller.into(),
            trial: None,
        }
    }

    #[must_use]
    pub fn with_trial(controller: impl Into<ControllerId>, trial: impl Into<TrialId>) -> Self {
        Self {
            controller: controller.into(),
            trial: Some(trial.into()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.trial {
            Some(trial) => write!(f, "{}/{trial}", self.controller),
            None => write!(f, "{}/*", self.controller),
        }
    }
}

/// Emitted on every scope mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeChange {
    pub previous: Option<Scope>,
    pub current: Option<Scope>,
}

impl ScopeChange {
    /// True when the scope identity differs from before the mutation.
    #[must_use]
    pub fn identity_changed(&self) -> bool {
        self.previous != self.current
    }
}

// ──────────────────── resolver ────────────────────

/// Single source of truth for the active scope.
///
/// UI components observe changes through [`ScopeResolver::subscribe`] rather
/// than holding their own copy of the selection.
#[derive(Debug, Default)]
pub struct ScopeResolver {
    active: Option<Scope>,
    observers: Vec<Sender<ScopeChange>>,
}

impl ScopeResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn active(&self) -> Option<&Scope> {
        self.active.as_ref()
    }

    /// Select a controller; the trial filter always resets to "all trials".
    pub fn select_controller(&mut self, controller: ControllerId) -> ScopeChange {
        self.replace(Some(Scope {
            controller,
            trial: None,
        }))
    }

    /// Narrow or widen the trial filter under the already-selected controller.
    pub fn select_trial_filter(&mut self, trial: Option<TrialId>) -> Result<ScopeChange> {
        let Some(current) = self.active.as_ref() else {
            return Err(SlvError::no_scope("select_trial_filter"));
        };
        let next = Scope {
            controller: current.controller.clone(),
            trial,
        };
        Ok(self.replace(Some(next)))
    }

    /// Jump straight to a full scope (controller plus optional trial).
    pub fn select_scope(&mut self, scope: Scope) -> ScopeChange {
        self.replace(Some(scope))
    }

    pub fn clear(&mut self) -> ScopeChange {
        self.replace(None)
    }

    /// Register an observer. Slow observers lose events rather than block selection.
    pub fn subscribe(&mut self) -> Receiver<ScopeChange> {
        let (tx, rx) = crossbeam_channel::bounded(OBSERVER_CHANNEL_CAPACITY);
        self.observers.push(tx);
        rx
    }

    fn replace(&mut self, next: Option<Scope>) -> ScopeChange {
        let previous = std::mem::replace(&mut self.active, next);
        let change = ScopeChange {
            previous,
            current: self.active.clone(),
        };
        self.notify(&change);
        change
    }

    fn notify(&mut self, change: &ScopeChange) {
        self.observers
            .retain(|tx| match tx.try_send(change.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selecting_controller_resets_trial_filter() {
        let mut resolver = ScopeResolver::new();
        resolver.select_scope(Scope::with_trial("c1", "t9"));

        let change = resolver.select_controller(ControllerId::from("c2"));

        assert_eq!(change.previous, Some(Scope::with_trial("c1", "t9")));
        assert_eq!(resolver.active(), Some(&Scope::controller("c2")));
        assert!(change.identity_changed());
    }

    #[test]
    fn reselecting_same_controller_drops_trial_filter() {
        let mut resolver = ScopeResolver::new();
        resolver.select_scope(Scope::with_trial("c1", "t9"));
        let change = resolver.select_controller(ControllerId::from("c1"));
        assert_eq!(change.current, Some(Scope::controller("c1")));
        assert!(change.identity_changed());
    }

    #[test]
    fn trial_filter_without_controller_is_a_precondition_error() {
        let mut resolver = ScopeResolver::new();
        let err = resolver
            .select_trial_filter(Some(TrialId::from("t1")))
            .expect_err("should fail without controller");
        assert_eq!(err.code(), "SLV-2001");
        assert!(resolver.active().is_none());
    }

    #[test]
    fn trial_filter_keeps_controller() {
        let mut resolver = ScopeResolver::new();
        resolver.select_controller(ControllerId::from("c1"));

        let change = resolver
            .select_trial_filter(Some(TrialId::from("t9")))
            .unwrap();
        assert_eq!(change.current, Some(Scope::with_trial("c1", "t9")));

        let widened = resolver.select_trial_filter(None).unwrap();
        assert_eq!(widened.current, Some(Scope::controller("c1")));
    }

    #[test]
    fn same_selection_reports_no_identity_change() {
        let mut resolver = ScopeResolver::new();
        resolver.select_controller(ControllerId::from("c1"));
        let change = resolver.select_trial_filter(None).unwrap();
        assert!(!change.identity_changed());
    }

    #[test]
    fn observers_receive_every_mutation() {
        let mut resolver = ScopeResolver::new();
        let rx = resolver.subscribe();

        resolver.select_controller(ControllerId::from("c1"));
        resolver
            .select_trial_filter(Some(TrialId::from("t2")))
            .unwrap();
        resolver.clear();

        let events: Vec<ScopeChange> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].current, Some(Scope::with_trial("c1", "t2")));
        assert_eq!(events[2].current, None);
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let mut resolver = ScopeResolver::new();
        let rx = resolver.subscribe();
        drop(rx);
        resolver.select_controller(ControllerId::from("c1"));
        assert!(resolver.observers.is_empty());
    }

    #[test]
    fn scope_display_marks_all_trials() {
        assert_eq!(Scope::controller("c1").to_string(), "c1/*");
        assert_eq!(Scope::with_trial("c1", "t9").to_string(), "c1/t9");
    }
}
