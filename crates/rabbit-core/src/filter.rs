//! Relay subscription filters (NIP-01).
//!
//! A [`Filter`] is the protocol query object sent in a `REQ`. Each populated
//! attribute narrows the match; an event matches a filter when it satisfies
//! every populated attribute, and a subscription with several filters
//! matches the union.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// A NIP-01 subscription filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Explicit event ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Event kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    /// Author public keys.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    /// Referenced event ids (`#e`).
    #[serde(rename = "#e", default, skip_serializing_if = "Option::is_none")]
    pub event_refs: Option<Vec<String>>,
    /// Identifier tag values (`#d`).
    #[serde(rename = "#d", default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<Vec<String>>,
}

impl Filter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given event ids.
    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to the given kinds.
    #[must_use]
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u32>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Restricts to the given authors.
    #[must_use]
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to events referencing one of the given ids in an `e` tag.
    #[must_use]
    pub fn event_refs<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_refs = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to events carrying one of the given `d` tag values.
    #[must_use]
    pub fn identifiers<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers = Some(identifiers.into_iter().map(Into::into).collect());
        self
    }

    /// Whether `event` satisfies every populated attribute.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        fn contains(values: Option<&Vec<String>>, value: &str) -> bool {
            values.map_or(true, |vs| vs.iter().any(|v| v == value))
        }

        fn tag_matches(values: Option<&Vec<String>>, event: &Event, name: &str) -> bool {
            values.map_or(true, |vs| {
                event.tags.iter().any(|tag| {
                    tag.first().is_some_and(|n| n == name)
                        && tag.get(1).is_some_and(|v| vs.contains(v))
                })
            })
        }

        contains(self.ids.as_ref(), &event.id)
            && self.kinds.as_ref().map_or(true, |ks| ks.contains(&event.kind))
            && contains(self.authors.as_ref(), &event.pubkey)
            && tag_matches(self.event_refs.as_ref(), event, "e")
            && tag_matches(self.identifiers.as_ref(), event, "d")
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}
