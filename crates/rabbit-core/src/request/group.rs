//! Per-kind task groups.
//!
//! A [`TaskGroup`] indexes the tasks of one [`RequestKind`] by their dedup
//! key. Every distinct key becomes part of the group's filters, and an
//! inbound event is fanned out to every task registered under the key the
//! event carries.
//!
//! The kind-specific behaviour is a [`KeyStrategy`]: how a request maps to
//! a key, how a set of keys maps to filters, and how an event maps back to
//! a key.

use std::sync::Arc;

use fxhash::FxHashMap;

use crate::event::{kind, Event};
use crate::filter::Filter;
use crate::task::{parameterized_replaceable_key, BatchedEventsTask, RequestDescriptor, RequestKind};

// ---------------------------------------------------------------------------
// KeyStrategy
// ---------------------------------------------------------------------------

/// A distinct key together with the descriptor of the first task that
/// registered it.
pub type KeyedRequest<'a> = (&'a str, &'a RequestDescriptor);

/// The three pure functions that specialise a [`TaskGroup`] to one kind.
#[derive(Clone, Copy)]
pub struct KeyStrategy {
    /// Dedup key of a request.
    pub key_of: fn(&RequestDescriptor) -> String,
    /// Smallest filter set covering the distinct keys.
    pub filters_for: fn(&[KeyedRequest<'_>]) -> Vec<Filter>,
    /// Key carried by an inbound event, if its shape has one.
    pub event_key: fn(&Event) -> Option<String>,
}

impl KeyStrategy {
    /// Returns the strategy for `kind`.
    #[must_use]
    pub fn for_kind(kind: RequestKind) -> Self {
        let (filters_for, event_key): (fn(&[KeyedRequest<'_>]) -> Vec<Filter>, fn(&Event) -> Option<String>) =
            match kind {
                RequestKind::Event => (event_filters, event_id_key),
                RequestKind::Profile => (profile_filters, author_key),
                RequestKind::Followings => (followings_filters, author_key),
                RequestKind::Reposts => (reposts_filters, mentioned_event_key),
                RequestKind::Reactions => (reactions_filters, mentioned_event_key),
                RequestKind::ZapReceipts => (zap_receipts_filters, mentioned_event_key),
                RequestKind::ParameterizedReplaceable => {
                    (parameterized_replaceable_filters, parameterized_replaceable_event_key)
                }
            };
        Self {
            key_of: RequestDescriptor::dedup_key,
            filters_for,
            event_key,
        }
    }
}

fn keys<'a>(requests: &'a [KeyedRequest<'a>]) -> impl Iterator<Item = &'a str> + 'a {
    requests.iter().map(|(key, _)| *key)
}

fn event_filters(requests: &[KeyedRequest<'_>]) -> Vec<Filter> {
    vec![Filter::new().ids(keys(requests))]
}

fn profile_filters(requests: &[KeyedRequest<'_>]) -> Vec<Filter> {
    vec![Filter::new().kinds([kind::METADATA]).authors(keys(requests))]
}

fn followings_filters(requests: &[KeyedRequest<'_>]) -> Vec<Filter> {
    vec![Filter::new().kinds([kind::CONTACTS]).authors(keys(requests))]
}

fn reposts_filters(requests: &[KeyedRequest<'_>]) -> Vec<Filter> {
    vec![Filter::new().kinds([kind::REPOST]).event_refs(keys(requests))]
}

fn reactions_filters(requests: &[KeyedRequest<'_>]) -> Vec<Filter> {
    vec![Filter::new().kinds([kind::REACTION]).event_refs(keys(requests))]
}

fn zap_receipts_filters(requests: &[KeyedRequest<'_>]) -> Vec<Filter> {
    vec![Filter::new().kinds([kind::ZAP_RECEIPT]).event_refs(keys(requests))]
}

/// One filter per key: each kind/author/identifier triple is distinct and
/// cannot be merged with the others.
fn parameterized_replaceable_filters(requests: &[KeyedRequest<'_>]) -> Vec<Filter> {
    requests
        .iter()
        .filter_map(|(_, descriptor)| match descriptor {
            RequestDescriptor::ParameterizedReplaceable {
                kind,
                author,
                identifier,
            } => Some(
                Filter::new()
                    .kinds([*kind])
                    .authors([author.as_str()])
                    .identifiers([identifier.as_str()]),
            ),
            _ => None,
        })
        .collect()
}

fn event_id_key(event: &Event) -> Option<String> {
    Some(event.id.clone())
}

fn author_key(event: &Event) -> Option<String> {
    Some(event.pubkey.clone())
}

fn mentioned_event_key(event: &Event) -> Option<String> {
    event.last_tagged_event_id().map(str::to_string)
}

fn parameterized_replaceable_event_key(event: &Event) -> Option<String> {
    let identifier = event.first_tag_value("d")?;
    Some(parameterized_replaceable_key(
        event.kind,
        &event.pubkey,
        identifier,
    ))
}

// ---------------------------------------------------------------------------
// TaskGroup
// ---------------------------------------------------------------------------

/// Tasks of one kind, indexed by dedup key.
///
/// Scoped to a single batch; never shared across batches.
pub struct TaskGroup {
    kind: RequestKind,
    strategy: KeyStrategy,
    /// Distinct keys in registration order.
    keys: Vec<String>,
    /// Tasks per key, in registration order.
    tasks: FxHashMap<String, Vec<Arc<BatchedEventsTask>>>,
}

impl TaskGroup {
    /// Creates an empty group for `kind`.
    #[must_use]
    pub fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            strategy: KeyStrategy::for_kind(kind),
            keys: Vec::new(),
            tasks: FxHashMap::default(),
        }
    }

    /// Returns the kind this group holds.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Registers `task` under its dedup key.
    pub fn add(&mut self, task: Arc<BatchedEventsTask>) {
        debug_assert_eq!(task.descriptor().kind(), self.kind);

        let key = (self.strategy.key_of)(task.descriptor());
        if let Some(tasks) = self.tasks.get_mut(&key) {
            tasks.push(task);
        } else {
            self.keys.push(key.clone());
            self.tasks.insert(key, vec![task]);
        }
    }

    /// Builds the filters covering every registered key.
    ///
    /// Returns an empty list if no task is registered.
    #[must_use]
    pub fn build_filters(&self) -> Vec<Filter> {
        if self.keys.is_empty() {
            return Vec::new();
        }

        let requests: Vec<KeyedRequest<'_>> = self
            .keys
            .iter()
            .filter_map(|key| {
                let first = self.tasks.get(key)?.first()?;
                Some((key.as_str(), first.descriptor()))
            })
            .collect();
        (self.strategy.filters_for)(&requests)
    }

    /// Delivers `event` to every task sharing its key.
    ///
    /// Returns `true` if at least one task was registered under the key.
    pub fn resolve(&self, event: &Event) -> bool {
        let Some(key) = (self.strategy.event_key)(event) else {
            return false;
        };
        let Some(tasks) = self.tasks.get(&key).filter(|tasks| !tasks.is_empty()) else {
            return false;
        };

        for task in tasks {
            task.add_event(event);
        }
        true
    }

    /// Returns the distinct keys in registration order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Returns the tasks registered under `key`.
    #[must_use]
    pub fn tasks_for(&self, key: &str) -> &[Arc<BatchedEventsTask>] {
        self.tasks.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    /// Returns `true` if no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("kind", &self.kind)
            .field("keys", &self.keys)
            .field("tasks", &self.len())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
