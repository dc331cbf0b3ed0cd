//! Composition of the per-kind task groups for one batch.

use std::sync::Arc;

use crate::event::{is_parameterized_replaceable, kind, Event};
use crate::filter::Filter;
use crate::request::group::TaskGroup;
use crate::task::{BatchedEventsTask, RequestKind};

/// Kind-specific groups consulted for an inbound event, highest priority
/// first. The generic [`RequestKind::Event`] group is only consulted when
/// none of these consumed the event.
const RESOLUTION_ORDER: [RequestKind; 6] = [
    RequestKind::Profile,
    RequestKind::Followings,
    RequestKind::Reposts,
    RequestKind::Reactions,
    RequestKind::ZapReceipts,
    RequestKind::ParameterizedReplaceable,
];

/// Whether events of `event_kind` can satisfy requests of `request_kind`.
fn accepts_event_kind(request_kind: RequestKind, event_kind: u32) -> bool {
    match request_kind {
        RequestKind::Profile => event_kind == kind::METADATA,
        RequestKind::Followings => event_kind == kind::CONTACTS,
        RequestKind::Reposts => event_kind == kind::REPOST,
        RequestKind::Reactions => event_kind == kind::REACTION,
        RequestKind::ZapReceipts => event_kind == kind::ZAP_RECEIPT,
        RequestKind::ParameterizedReplaceable => is_parameterized_replaceable(event_kind),
        RequestKind::Event => true,
    }
}

/// The seven task groups of one batch.
///
/// Built fresh for every dispatched batch; it merges the groups' filters
/// into one subscription and routes each inbound event back to the tasks it
/// satisfies.
#[derive(Debug)]
pub struct RequestBuilder {
    events: TaskGroup,
    profiles: TaskGroup,
    followings: TaskGroup,
    reposts: TaskGroup,
    reactions: TaskGroup,
    zap_receipts: TaskGroup,
    parameterized_replaceable: TaskGroup,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    /// Creates a builder with empty groups.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: TaskGroup::new(RequestKind::Event),
            profiles: TaskGroup::new(RequestKind::Profile),
            followings: TaskGroup::new(RequestKind::Followings),
            reposts: TaskGroup::new(RequestKind::Reposts),
            reactions: TaskGroup::new(RequestKind::Reactions),
            zap_receipts: TaskGroup::new(RequestKind::ZapReceipts),
            parameterized_replaceable: TaskGroup::new(RequestKind::ParameterizedReplaceable),
        }
    }

    /// Creates a builder holding `tasks`.
    #[must_use]
    pub fn from_tasks<'a, I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<BatchedEventsTask>>,
    {
        let mut builder = Self::new();
        for task in tasks {
            builder.add(Arc::clone(task));
        }
        builder
    }

    /// Returns the group holding requests of `kind`.
    #[must_use]
    pub fn group(&self, kind: RequestKind) -> &TaskGroup {
        match kind {
            RequestKind::Event => &self.events,
            RequestKind::Profile => &self.profiles,
            RequestKind::Followings => &self.followings,
            RequestKind::Reposts => &self.reposts,
            RequestKind::Reactions => &self.reactions,
            RequestKind::ZapReceipts => &self.zap_receipts,
            RequestKind::ParameterizedReplaceable => &self.parameterized_replaceable,
        }
    }

    fn group_mut(&mut self, kind: RequestKind) -> &mut TaskGroup {
        match kind {
            RequestKind::Event => &mut self.events,
            RequestKind::Profile => &mut self.profiles,
            RequestKind::Followings => &mut self.followings,
            RequestKind::Reposts => &mut self.reposts,
            RequestKind::Reactions => &mut self.reactions,
            RequestKind::ZapReceipts => &mut self.zap_receipts,
            RequestKind::ParameterizedReplaceable => &mut self.parameterized_replaceable,
        }
    }

    /// Adds `task` to the group matching its descriptor.
    pub fn add(&mut self, task: Arc<BatchedEventsTask>) {
        let kind = task.descriptor().kind();
        self.group_mut(kind).add(task);
    }

    /// Concatenates every group's filters in [`RequestKind::ALL`] order.
    ///
    /// Empty only if every group is empty.
    #[must_use]
    pub fn build_filters(&self) -> Vec<Filter> {
        RequestKind::ALL
            .into_iter()
            .flat_map(|kind| self.group(kind).build_filters())
            .collect()
    }

    /// Routes `event` to the tasks it satisfies.
    ///
    /// Kind-specific groups are tried in priority order. If none of them
    /// consumed the event, it is offered to the generic by-id group
    /// whatever its kind, so a reaction that matches no pending reactions
    /// key can still satisfy a request for that exact event.
    ///
    /// Returns `true` if any task received the event.
    pub fn resolve(&self, event: &Event) -> bool {
        let consumed = RESOLUTION_ORDER.into_iter().any(|kind| {
            accepts_event_kind(kind, event.kind) && self.group(kind).resolve(event)
        });
        consumed || self.events.resolve(event)
    }

    /// Returns the total number of tasks across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        RequestKind::ALL
            .into_iter()
            .map(|kind| self.group(kind).len())
            .sum()
    }

    /// Returns `true` if every group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        RequestKind::ALL
            .into_iter()
            .all(|kind| self.group(kind).is_empty())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
