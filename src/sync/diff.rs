//! Snapshot diffing against a watermark, and the live view that new rows merge into.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::model::record::{Record, SequenceKey};

/// Outcome of classifying one snapshot against the scope's watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDiff {
    /// Records newer than the watermark, most recent first.
    pub new_records: Vec<Record>,
    /// Maximum key across the whole snapshot; `None` only for an empty snapshot.
    pub next_watermark: Option<SequenceKey>,
    /// The watermark was the sentinel, so every record counts as new.
    pub first_load: bool,
}

/// Classify a raw snapshot against `watermark`.
///
/// The snapshot is sorted by key descending and duplicate keys are collapsed
/// (first occurrence wins). On first load every record is new.
#[must_use]
pub fn diff_snapshot(mut snapshot: Vec<Record>, watermark: Option<&SequenceKey>) -> SnapshotDiff {
    snapshot.sort_by(|a, b| b.key.cmp(&a.key));
    snapshot.dedup_by(|later, earlier| later.key == earlier.key);

    let next_watermark = snapshot.first().map(|record| record.key.clone());
    let new_records = match watermark {
        None => snapshot,
        Some(mark) => snapshot
            .into_iter()
            .take_while(|record| record.key > *mark)
            .collect(),
    };

    SnapshotDiff {
        new_records,
        next_watermark,
        first_load: watermark.is_none(),
    }
}

// ──────────────────── live view ────────────────────

/// One displayed row.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewRow {
    pub record: Record,
    /// Set on incremental inserts; cleared by [`LiveView::expire_fresh`].
    pub fresh_until: Option<Instant>,
}

impl ViewRow {
    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.fresh_until.is_some_and(|deadline| now < deadline)
    }
}

/// The rows currently displayed for the active view, most recent first.
///
/// Existing rows are never reordered or removed by a merge.
#[derive(Debug, Default, Clone)]
pub struct LiveView {
    rows: Vec<ViewRow>,
    keys: HashSet<SequenceKey>,
}

impl LiveView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn rows(&self) -> &[ViewRow] {
        &self.rows
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter().map(|row| &row.record)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &SequenceKey) -> bool {
        self.keys.contains(key)
    }

    /// Prepend the diff's new records and return the keys actually inserted.
    ///
    /// Incremental inserts carry a fresh marker until `now + fresh_for`; a
    /// first load renders plain. Keys already displayed are skipped.
    pub fn merge(&mut self, diff: SnapshotDiff, now: Instant, fresh_for: Duration) -> Vec<SequenceKey> {
        let fresh_until = if diff.first_load {
            None
        } else {
            Some(now + fresh_for)
        };

        let mut inserted = Vec::with_capacity(diff.new_records.len());
        let mut incoming = Vec::with_capacity(diff.new_records.len());
        for record in diff.new_records {
            if self.keys.insert(record.key.clone()) {
                inserted.push(record.key.clone());
                incoming.push(ViewRow {
                    record,
                    fresh_until,
                });
            }
        }

        if !incoming.is_empty() {
            incoming.append(&mut self.rows);
            self.rows = incoming;
        }
        inserted
    }

    /// Clear markers whose deadline has passed; returns the keys that changed.
    pub fn expire_fresh(&mut self, now: Instant) -> Vec<SequenceKey> {
        let mut expired = Vec::new();
        for row in &mut self.rows {
            if let Some(deadline) = row.fresh_until
                && now >= deadline
            {
                row.fresh_until = None;
                expired.push(row.record.key.clone());
            }
        }
        expired
    }

    /// Earliest pending fresh deadline, for scheduling the next expiry pass.
    #[must_use]
    pub fn next_fresh_deadline(&self) -> Option<Instant> {
        self.rows.iter().filter_map(|row| row.fresh_until).min()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.keys.clear();
    }
}

/// Presentation-facing state of the active view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewStatus {
    /// No view active.
    Inactive,
    /// Activated, waiting for the first snapshot.
    Loading,
    /// At least one snapshot rendered.
    Live,
    /// Snapshots so far were empty.
    Empty,
    /// Last tick failed; polling continues.
    Error {
        message: String,
        consecutive_failures: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::LogEvent;

    fn log(id: u64) -> Record {
        Record::log(
            id,
            None,
            LogEvent {
                tag: "SYS".to_string(),
                message: format!("event {id}"),
            },
        )
    }

    fn keys(records: &[Record]) -> Vec<u64> {
        records
            .iter()
            .map(|r| match r.key {
                SequenceKey::Id(id) => id,
                SequenceKey::Timestamp(_) => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn first_load_returns_everything_sorted_descending() {
        let diff = diff_snapshot(vec![log(3), log(5), log(1)], None);
        assert!(diff.first_load);
        assert_eq!(keys(&diff.new_records), vec![5, 3, 1]);
        assert_eq!(diff.next_watermark, Some(SequenceKey::Id(5)));
    }

    #[test]
    fn only_keys_above_watermark_are_new() {
        let mark = SequenceKey::Id(5);
        let diff = diff_snapshot(vec![log(7), log(5), log(3), log(1)], Some(&mark));
        assert!(!diff.first_load);
        assert_eq!(keys(&diff.new_records), vec![7]);
        assert_eq!(diff.next_watermark, Some(SequenceKey::Id(7)));
    }

    #[test]
    fn watermark_from_whole_snapshot_even_without_new_rows() {
        let mark = SequenceKey::Id(9);
        let diff = diff_snapshot(vec![log(4), log(2)], Some(&mark));
        assert!(diff.new_records.is_empty());
        assert_eq!(diff.next_watermark, Some(SequenceKey::Id(4)));
    }

    #[test]
    fn duplicate_keys_in_snapshot_collapse() {
        let diff = diff_snapshot(vec![log(2), log(2), log(1)], None);
        assert_eq!(keys(&diff.new_records), vec![2, 1]);
    }

    #[test]
    fn empty_snapshot_has_no_watermark() {
        let diff = diff_snapshot(Vec::new(), None);
        assert!(diff.new_records.is_empty());
        assert!(diff.next_watermark.is_none());
    }

    #[test]
    fn merge_prepends_and_marks_increments_fresh() {
        let now = Instant::now();
        let fresh = Duration::from_secs(5);
        let mut view = LiveView::new();

        let first = view.merge(diff_snapshot(vec![log(1), log(3)], None), now, fresh);
        assert_eq!(first, vec![SequenceKey::Id(3), SequenceKey::Id(1)]);
        assert!(view.rows().iter().all(|row| row.fresh_until.is_none()));

        let mark = SequenceKey::Id(3);
        let inserted = view.merge(
            diff_snapshot(vec![log(4), log(3), log(1)], Some(&mark)),
            now,
            fresh,
        );
        assert_eq!(inserted, vec![SequenceKey::Id(4)]);

        let order: Vec<Record> = view.records().cloned().collect();
        assert_eq!(keys(&order), vec![4, 3, 1]);
        assert!(view.rows()[0].is_fresh(now));
        assert!(!view.rows()[1].is_fresh(now));
        assert_eq!(view.next_fresh_deadline(), Some(now + fresh));
    }

    #[test]
    fn merge_skips_keys_already_displayed() {
        let now = Instant::now();
        let mut view = LiveView::new();
        view.merge(diff_snapshot(vec![log(2)], None), now, Duration::ZERO);

        let stale_mark = SequenceKey::Id(1);
        let inserted = view.merge(
            diff_snapshot(vec![log(2), log(1)], Some(&stale_mark)),
            now,
            Duration::ZERO,
        );
        assert!(inserted.is_empty());
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn expire_fresh_clears_only_past_deadlines() {
        let now = Instant::now();
        let mut view = LiveView::new();
        view.merge(diff_snapshot(vec![log(1)], None), now, Duration::ZERO);
        let mark = SequenceKey::Id(1);
        view.merge(
            diff_snapshot(vec![log(2), log(1)], Some(&mark)),
            now,
            Duration::from_secs(3),
        );

        assert!(view.expire_fresh(now + Duration::from_secs(1)).is_empty());
        let expired = view.expire_fresh(now + Duration::from_secs(3));
        assert_eq!(expired, vec![SequenceKey::Id(2)]);
        assert!(view.next_fresh_deadline().is_none());
    }
}
