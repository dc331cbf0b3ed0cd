//! Tasks whose result is a list of relay events.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::event::{insert_event_descending, pick_latest_event, Event};
use crate::task::ObservableTask;

// ---------------------------------------------------------------------------
// RequestKind
// ---------------------------------------------------------------------------

/// Discriminant of a [`RequestDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Profile metadata of a pubkey.
    Profile,
    /// A single event by id.
    Event,
    /// Contact list of a pubkey.
    Followings,
    /// Reactions to an event.
    Reactions,
    /// Reposts of an event.
    Reposts,
    /// Zap receipts for an event.
    ZapReceipts,
    /// A parameterized replaceable event by kind, author and identifier.
    ParameterizedReplaceable,
}

impl RequestKind {
    /// All kinds, in filter-building order.
    pub const ALL: [RequestKind; 7] = [
        Self::Event,
        Self::Profile,
        Self::Followings,
        Self::Reposts,
        Self::Reactions,
        Self::ZapReceipts,
        Self::ParameterizedReplaceable,
    ];

    /// Returns the tag name of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "Profile",
            Self::Event => "Event",
            Self::Followings => "Followings",
            Self::Reactions => "Reactions",
            Self::Reposts => "Reposts",
            Self::ZapReceipts => "ZapReceipts",
            Self::ParameterizedReplaceable => "ParameterizedReplaceable",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnknownTaskKind(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// RequestDescriptor
// ---------------------------------------------------------------------------

/// What a [`BatchedEventsTask`] asks the relays for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestDescriptor {
    /// Latest profile metadata of `pubkey`.
    Profile {
        /// Author public key.
        pubkey: String,
    },
    /// The event with id `event_id`.
    Event {
        /// Event id.
        event_id: String,
    },
    /// Contact list of `pubkey`.
    Followings {
        /// Author public key.
        pubkey: String,
    },
    /// Reactions referencing `mentioned_event_id`.
    Reactions {
        /// Referenced event id.
        mentioned_event_id: String,
    },
    /// Reposts referencing `mentioned_event_id`.
    Reposts {
        /// Referenced event id.
        mentioned_event_id: String,
    },
    /// Zap receipts referencing `mentioned_event_id`.
    ZapReceipts {
        /// Referenced event id.
        mentioned_event_id: String,
    },
    /// Parameterized replaceable event addressed by `kind:author:identifier`.
    ParameterizedReplaceable {
        /// Event kind.
        kind: u32,
        /// Author public key.
        author: String,
        /// `d` tag value.
        identifier: String,
    },
}

impl RequestDescriptor {
    /// Returns the variant tag.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Profile { .. } => RequestKind::Profile,
            Self::Event { .. } => RequestKind::Event,
            Self::Followings { .. } => RequestKind::Followings,
            Self::Reactions { .. } => RequestKind::Reactions,
            Self::Reposts { .. } => RequestKind::Reposts,
            Self::ZapReceipts { .. } => RequestKind::ZapReceipts,
            Self::ParameterizedReplaceable { .. } => RequestKind::ParameterizedReplaceable,
        }
    }

    /// Returns the semantic key requests of the same kind are merged by.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        match self {
            Self::Profile { pubkey } | Self::Followings { pubkey } => pubkey.clone(),
            Self::Event { event_id } => event_id.clone(),
            Self::Reactions { mentioned_event_id }
            | Self::Reposts { mentioned_event_id }
            | Self::ZapReceipts { mentioned_event_id } => mentioned_event_id.clone(),
            Self::ParameterizedReplaceable {
                kind,
                author,
                identifier,
            } => parameterized_replaceable_key(*kind, author, identifier),
        }
    }
}

/// Key of a parameterized replaceable event: `kind:author:identifier`.
#[must_use]
pub fn parameterized_replaceable_key(kind: u32, author: &str, identifier: &str) -> String {
    format!("{kind}:{author}:{identifier}")
}

// ---------------------------------------------------------------------------
// BatchedEventsTask
// ---------------------------------------------------------------------------

/// A task that accumulates relay events for one [`RequestDescriptor`].
///
/// The accumulated list is kept free of duplicate ids and ordered newest
/// first as events are merged in.
pub type BatchedEventsTask = ObservableTask<RequestDescriptor, Vec<Event>>;

impl BatchedEventsTask {
    /// Creates a pending task for `descriptor`.
    #[must_use]
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self::with_request(descriptor)
    }

    /// Returns the request descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &RequestDescriptor {
        self.request()
    }

    /// Merges `event` into the accumulated list.
    ///
    /// Returns `false` if the task has already completed.
    pub fn add_event(&self, event: &Event) -> bool {
        self.update(|current| insert_event_descending(current.unwrap_or_default(), event))
    }

    /// Returns the accumulated events (empty if none arrived yet).
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.value().unwrap_or_default()
    }

    /// Waits for the first delivered event.
    ///
    /// Resolves only if at least one event arrives; see
    /// [`first_update`](ObservableTask::first_update).
    ///
    /// # Errors
    ///
    /// [`Error::TaskClosed`] if the task's signal channel closes first.
    pub async fn first_event(&self) -> Result<Event, Error> {
        let events = self.first_update().await?;
        events.into_iter().next().ok_or(Error::NotFound)
    }

    /// Waits for completion and returns the newest accumulated event.
    ///
    /// Equal timestamps resolve to the lowest event id.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the task completed without any event.
    pub async fn latest_event(&self) -> Result<Event, Error> {
        let events = self.completion().await?.unwrap_or_default();
        pick_latest_event(&events).cloned().ok_or(Error::NotFound)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
