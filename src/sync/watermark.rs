//! Per-scope high-water marks.

#![allow(missing_docs)]

use std::collections::HashMap;

use crate::model::record::SequenceKey;
use crate::model::scope::Scope;

/// Highest sequence key observed per scope. Entries never move backwards.
#[derive(Debug, Default, Clone)]
pub struct WatermarkTracker {
    marks: HashMap<Scope, SequenceKey>,
}

impl WatermarkTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means no data has been seen for this scope yet.
    #[must_use]
    pub fn get(&self, scope: &Scope) -> Option<&SequenceKey> {
        self.marks.get(scope)
    }

    /// Record `key` if it is strictly greater than the current mark.
    ///
    /// Returns whether the mark moved.
    pub fn advance(&mut self, scope: &Scope, key: SequenceKey) -> bool {
        match self.marks.get_mut(scope) {
            Some(current) if key > *current => {
                *current = key;
                true
            }
            Some(_) => false,
            None => {
                self.marks.insert(scope.clone(), key);
                true
            }
        }
    }

    pub fn reset(&mut self, scope: &Scope) {
        self.marks.remove(scope);
    }

    pub fn clear(&mut self) {
        self.marks.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}
