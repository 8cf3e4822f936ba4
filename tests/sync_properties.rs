//! Property tests for watermark diffing, live view merging and CSV escaping.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use proptest::prelude::*;
use sensor_live_view::export::csv::{escape_field, to_csv};
use sensor_live_view::model::record::{DataFamily, LogEvent, Record, SequenceKey};
use sensor_live_view::model::scope::Scope;
use sensor_live_view::present::format::DisplayClock;
use sensor_live_view::sync::diff::{LiveView, diff_snapshot};
use sensor_live_view::sync::watermark::WatermarkTracker;

fn log(id: u64, message: &str) -> Record {
    Record::log(
        id,
        None,
        LogEvent {
            tag: "SYS".to_string(),
            message: message.to_string(),
        },
    )
}

fn snapshot(ids: &[u64]) -> Vec<Record> {
    ids.iter().map(|id| log(*id, "event")).collect()
}

/// Split one CSV line produced by `to_csv` back into raw fields.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut current)),
            (other, _) => current.push(other),
        }
    }
    fields.push(current);
    fields
}

proptest! {
    #[test]
    fn watermark_never_moves_backwards(
        batches in prop::collection::vec(prop::collection::vec(0u64..500, 0..20), 1..12)
    ) {
        let scope = Scope::controller("c1");
        let mut tracker = WatermarkTracker::new();
        let mut previous: Option<SequenceKey> = None;
        for batch in batches {
            let diff = diff_snapshot(snapshot(&batch), tracker.get(&scope));
            if let Some(next) = diff.next_watermark {
                tracker.advance(&scope, next);
            }
            let current = tracker.get(&scope).cloned();
            if let (Some(before), Some(after)) = (&previous, &current) {
                prop_assert!(after >= before);
            }
            if previous.is_some() {
                prop_assert!(current.is_some());
            }
            previous = current;
        }
    }

    #[test]
    fn merged_view_has_unique_keys_in_descending_order(
        batches in prop::collection::vec(prop::collection::vec(0u64..200, 0..25), 1..10)
    ) {
        let scope = Scope::controller("c1");
        let mut tracker = WatermarkTracker::new();
        let mut view = LiveView::new();
        let now = Instant::now();
        for batch in batches {
            let diff = diff_snapshot(snapshot(&batch), tracker.get(&scope));
            if let Some(next) = diff.next_watermark.clone() {
                tracker.advance(&scope, next);
            }
            view.merge(diff, now, Duration::from_secs(5));

            let keys: Vec<&SequenceKey> = view.records().map(|record| &record.key).collect();
            let unique: HashSet<&SequenceKey> = keys.iter().copied().collect();
            prop_assert_eq!(unique.len(), keys.len());
            prop_assert!(keys.windows(2).all(|pair| pair[0] > pair[1]));
        }
    }

    #[test]
    fn first_load_keeps_every_distinct_record(ids in prop::collection::vec(0u64..1000, 0..40)) {
        let diff = diff_snapshot(snapshot(&ids), None);
        let distinct: HashSet<u64> = ids.iter().copied().collect();
        prop_assert!(diff.first_load);
        prop_assert_eq!(diff.new_records.len(), distinct.len());
        prop_assert_eq!(
            diff.next_watermark.clone(),
            ids.iter().max().map(|max| SequenceKey::Id(*max))
        );

        let mut view = LiveView::new();
        let inserted = view.merge(diff, Instant::now(), Duration::from_secs(5));
        prop_assert_eq!(inserted.len(), distinct.len());
        prop_assert!(view.rows().iter().all(|row| row.fresh_until.is_none()));
    }

    #[test]
    fn escaped_messages_keep_their_field_count(
        messages in prop::collection::vec("[a-z ,\"]{0,12}", 1..8)
    ) {
        let records: Vec<Record> = messages
            .iter()
            .enumerate()
            .map(|(index, message)| log(index as u64 + 1, message))
            .collect();
        let csv = to_csv(DataFamily::Logs, records.iter(), &DisplayClock::utc());
        let lines: Vec<&str> = csv.lines().collect();
        prop_assert_eq!(lines.len(), records.len() + 1);
        for (line, message) in lines[1..].iter().zip(&messages) {
            let fields = split_line(line);
            prop_assert_eq!(fields.len(), 5);
            prop_assert_eq!(&fields[4], message);
        }
    }

    #[test]
    fn escaping_is_identity_for_plain_fields(field in "[A-Za-z0-9 .:-]{0,20}") {
        let escaped = escape_field(&field);
        prop_assert_eq!(escaped.as_ref(), field.as_str());
    }
}
