//! Relay pool seam.
//!
//! The pool owns the relay connections and multiplexes subscriptions over
//! them. The engine only opens one subscription per batch, reads its
//! messages until end-of-stream, and closes it.

use async_trait::async_trait;

use crate::error::Error;
use crate::event::Event;
use crate::filter::Filter;

/// A message delivered on a relay subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// A stored or newly published event matching the filters.
    Event(Event),
    /// All stored events have been delivered (`EOSE`).
    EndOfStoredEvents,
}

/// An open subscription on the relay pool.
#[async_trait]
pub trait RelaySubscription: Send {
    /// Returns the next message, or `None` once the pool has dropped the
    /// subscription.
    async fn next_message(&mut self) -> Option<RelayMessage>;

    /// Releases the subscription.
    fn close(&mut self);
}

/// The relay pool collaborator.
pub trait RelayPool: Send + Sync {
    /// Opens one logical subscription with `filters` against `relay_urls`.
    ///
    /// # Errors
    ///
    /// [`Error::Pool`] if the subscription cannot be opened.
    fn subscribe(
        &self,
        relay_urls: &[String],
        filters: Vec<Filter>,
    ) -> Result<Box<dyn RelaySubscription>, Error>;
}
