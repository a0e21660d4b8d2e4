use std::collections::HashMap;

use crate::event::Event;

/// Combine `existing` with `incoming` into the canonical timeline order.
///
/// Unique by `id` with the incoming copy winning, sorted by `(timestamp, id)`.
/// Merging the same batch again is a no-op, so overlapping or reordered poll
/// results can be applied without checking what is already present.
pub fn merge(existing: &[Event], incoming: impl IntoIterator<Item = Event>) -> Vec<Event> {
    let mut by_id: HashMap<String, Event> = existing
        .iter()
        .map(|e| (e.id.clone(), e.clone()))
        .collect();
    for event in incoming {
        by_id.insert(event.id.clone(), event);
    }

    let mut out: Vec<Event> = by_id.into_values().collect();
    out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ev(id: &str, t: i64) -> Event {
        ev_body(id, t, "msg")
    }

    fn ev_body(id: &str, t: i64, body: &str) -> Event {
        Event {
            id: id.to_string(),
            sender: "CSENDER".to_string(),
            timestamp: Utc.timestamp_opt(t, 0).unwrap(),
            transaction_ref: format!("tx-{id}"),
            body: body.to_string(),
            ledger: None,
        }
    }

    fn ids(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn overlapping_batches_do_not_duplicate() {
        let history = vec![ev("1", 10), ev("2", 20)];
        let poll = vec![ev("2", 20), ev("3", 30)];
        let merged = merge(&history, poll);
        assert_eq!(ids(&merged), vec!["1", "2", "3"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let base = vec![ev("a", 5), ev("c", 1)];
        let batch = vec![ev("b", 3), ev("a", 5), ev("d", 3)];
        let once = merge(&base, batch.clone());
        let twice = merge(&once, batch);
        assert_eq!(once, twice);
    }

    #[test]
    fn ties_on_timestamp_break_by_id() {
        let merged = merge(&[], vec![ev("z", 7), ev("m", 7), ev("a", 7), ev("q", 1)]);
        assert_eq!(ids(&merged), vec!["q", "a", "m", "z"]);
    }

    #[test]
    fn incoming_wins_on_conflicting_id() {
        let existing = vec![ev_body("1", 10, "old")];
        let merged = merge(&existing, vec![ev_body("1", 10, "new")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].body, "new");
    }

    #[test]
    fn source_order_does_not_matter_for_identical_events() {
        let a = vec![ev("1", 1), ev("2", 2)];
        let b = vec![ev("2", 2), ev("3", 3)];
        assert_eq!(merge(&merge(&[], a.clone()), b.clone()), merge(&merge(&[], b), a));
    }

    #[test]
    fn result_is_unique_and_sorted() {
        let existing: Vec<Event> = (0..20).map(|i| ev(&format!("e{i}"), (i * 7) % 5)).collect();
        let incoming: Vec<Event> = (10..30).map(|i| ev(&format!("e{i}"), (i * 3) % 4)).collect();
        let merged = merge(&existing, incoming);

        let mut seen = std::collections::HashSet::new();
        assert!(merged.iter().all(|e| seen.insert(e.id.clone())));
        assert_eq!(merged.len(), 30);
        assert!(merged
            .windows(2)
            .all(|w| (w[0].timestamp, &w[0].id) <= (w[1].timestamp, &w[1].id)));
    }
}
