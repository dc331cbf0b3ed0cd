//! Nostr events as delivered by the relay pool.
//!
//! Only the fields the engine reads are interpreted; signatures are carried
//! through untouched and never verified here.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Well-known event kinds.
pub mod kind {
    /// User metadata (profile).
    pub const METADATA: u32 = 0;
    /// Contact list (followings).
    pub const CONTACTS: u32 = 3;
    /// Repost.
    pub const REPOST: u32 = 6;
    /// Reaction.
    pub const REACTION: u32 = 7;
    /// Zap receipt.
    pub const ZAP_RECEIPT: u32 = 9735;
    /// Parameterized replaceable event range.
    pub const PARAMETERIZED_REPLACEABLE: std::ops::Range<u32> = 30_000..40_000;
}

/// A signed relay event (NIP-01 JSON shape).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Event id (hex).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Creation time in unix seconds.
    pub created_at: u64,
    /// Event kind.
    pub kind: u32,
    /// Ordered tag arrays, e.g. `["e", "<id>", "<relay>"]`.
    pub tags: Vec<Vec<String>>,
    /// Event content.
    pub content: String,
    /// Schnorr signature (hex).
    pub sig: String,
}

impl Event {
    /// Returns the value of the first tag named `name`.
    #[must_use]
    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.first().is_some_and(|n| n == name))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    /// Returns the event id referenced by the last `e` tag.
    ///
    /// Older clients append the primary reference last, so reactions,
    /// reposts and zap receipts are keyed by the last reference rather
    /// than the first.
    #[must_use]
    pub fn last_tagged_event_id(&self) -> Option<&str> {
        self.tags
            .iter()
            .rev()
            .find(|tag| tag.first().is_some_and(|n| n == "e"))
            .and_then(|tag| tag.get(1))
            .map(String::as_str)
    }

    /// Whether the kind falls in the parameterized replaceable range.
    #[must_use]
    pub fn is_parameterized_replaceable(&self) -> bool {
        is_parameterized_replaceable(self.kind)
    }
}

/// Whether `kind` falls in the parameterized replaceable range.
#[must_use]
pub fn is_parameterized_replaceable(event_kind: u32) -> bool {
    kind::PARAMETERIZED_REPLACEABLE.contains(&event_kind)
}

/// Orders events newest first; equal timestamps order by ascending id.
#[must_use]
pub fn compare_events(a: &Event, b: &Event) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Merges `event` into a list kept in [`compare_events`] order.
///
/// Events already present (by id) are not inserted twice.
#[must_use]
pub fn insert_event_descending(mut events: Vec<Event>, event: &Event) -> Vec<Event> {
    if events.iter().any(|e| e.id == event.id) {
        return events;
    }
    let pos = events.partition_point(|e| compare_events(e, event) == Ordering::Less);
    events.insert(pos, event.clone());
    events
}

/// Picks the newest event; ties go to the lowest id.
#[must_use]
pub fn pick_latest_event(events: &[Event]) -> Option<&Event> {
    events.iter().min_by(|a, b| compare_events(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(id: &str, created_at: u64) -> Event {
        Event {
            id: id.into(),
            pubkey: "pk".into(),
            created_at,
            kind: kind::REACTION,
            tags: Vec::new(),
            content: String::new(),
            sig: String::new(),
        }
    }

    fn tagged(tags: &[&[&str]]) -> Event {
        let mut event = make_event("a", 1);
        event.tags = tags
            .iter()
            .map(|t| t.iter().map(|s| (*s).to_string()).collect())
            .collect();
        event
    }

    #[test]
    fn test_last_tagged_event_id_uses_last_reference() {
        let event = tagged(&[&["e", "root"], &["p", "someone"], &["e", "target"]]);
        assert_eq!(event.last_tagged_event_id(), Some("target"));
    }

    #[test]
    fn test_last_tagged_event_id_missing() {
        assert_eq!(tagged(&[&["p", "x"]]).last_tagged_event_id(), None);
        // A bare tag name without a value carries no reference.
        assert_eq!(tagged(&[&["e"]]).last_tagged_event_id(), None);
    }

    #[test]
    fn test_first_tag_value() {
        let event = tagged(&[&["d", "list"], &["d", "other"]]);
        assert_eq!(event.first_tag_value("d"), Some("list"));
        assert_eq!(event.first_tag_value("t"), None);
    }

    #[test]
    fn test_parameterized_replaceable_range() {
        assert!(!is_parameterized_replaceable(29_999));
        assert!(is_parameterized_replaceable(30_000));
        assert!(is_parameterized_replaceable(30_023));
        assert!(is_parameterized_replaceable(39_999));
        assert!(!is_parameterized_replaceable(40_000));
    }

    #[test]
    fn test_insert_keeps_descending_order() {
        let mut events = Vec::new();
        for (id, ts) in [("b", 20), ("a", 10), ("c", 30), ("d", 15)] {
            events = insert_event_descending(events, &make_event(id, ts));
        }
        let order: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn test_insert_dedups_by_id() {
        let events = insert_event_descending(Vec::new(), &make_event("a", 10));
        let events = insert_event_descending(events, &make_event("a", 10));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_insert_ties_order_by_id() {
        let mut events = Vec::new();
        for id in ["c", "a", "b"] {
            events = insert_event_descending(events, &make_event(id, 5));
        }
        let order: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_pick_latest_event() {
        assert!(pick_latest_event(&[]).is_none());

        let events = vec![make_event("x", 5), make_event("y", 9), make_event("a", 9)];
        assert_eq!(pick_latest_event(&events).map(|e| e.id.as_str()), Some("a"));
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"id":"1","pubkey":"2","created_at":3,"kind":7,"tags":[["e","x"]],"content":"+","sig":"s"}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind, kind::REACTION);
        assert_eq!(event.last_tagged_event_id(), Some("x"));
    }
}
