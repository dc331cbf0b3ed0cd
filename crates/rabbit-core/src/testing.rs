//! Testing utilities: in-memory relay pools.
//!
//! [`MockRelayPool`] records every subscription it opens. In the default
//! mode it replays its stored events that match the subscription filters
//! and then signals end-of-stream; in manual mode nothing is delivered until
//! the test pushes messages through the [`RecordedSubscription`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::event::Event;
use crate::filter::Filter;
use crate::pool::{RelayMessage, RelayPool, RelaySubscription};

// ---------------------------------------------------------------------------
// RecordedSubscription
// ---------------------------------------------------------------------------

/// A subscription opened on a [`MockRelayPool`].
#[derive(Debug, Clone)]
pub struct RecordedSubscription {
    /// Relays the subscription was opened against.
    pub relay_urls: Vec<String>,
    /// Filters the subscription was opened with.
    pub filters: Vec<Filter>,
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<RelayMessage>>>>,
    closed: Arc<AtomicBool>,
}

impl RecordedSubscription {
    /// Delivers `message` on the subscription.
    ///
    /// Returns `false` if the subscription was closed or disconnected.
    pub fn send(&self, message: RelayMessage) -> bool {
        self.sender
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    /// Drops the pool side without signalling end-of-stream.
    pub fn disconnect(&self) {
        self.sender.lock().take();
    }

    /// Whether the consumer closed the subscription.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Whether any filter of this subscription matches `event`.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.filters.iter().any(|f| f.matches(event))
    }
}

struct MockSubscription {
    receiver: mpsc::UnboundedReceiver<RelayMessage>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl RelaySubscription for MockSubscription {
    async fn next_message(&mut self) -> Option<RelayMessage> {
        self.receiver.recv().await
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Release);
        self.receiver.close();
    }
}

// ---------------------------------------------------------------------------
// MockRelayPool
// ---------------------------------------------------------------------------

/// In-memory relay pool for tests.
#[derive(Debug, Default)]
pub struct MockRelayPool {
    stored: Mutex<Vec<Event>>,
    subscriptions: Mutex<Vec<RecordedSubscription>>,
    manual: bool,
}

impl MockRelayPool {
    /// Creates a pool that replays stored events and then signals
    /// end-of-stream on every subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool that delivers nothing on its own.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }

    /// Stores `event` for replay on later subscriptions.
    pub fn store(&self, event: Event) {
        self.stored.lock().push(event);
    }

    /// Returns every subscription opened so far, oldest first.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<RecordedSubscription> {
        self.subscriptions.lock().clone()
    }

    /// Returns the number of subscriptions opened so far.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl RelayPool for MockRelayPool {
    fn subscribe(
        &self,
        relay_urls: &[String],
        filters: Vec<Filter>,
    ) -> Result<Box<dyn RelaySubscription>, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let recorded = RecordedSubscription {
            relay_urls: relay_urls.to_vec(),
            filters,
            sender: Arc::new(Mutex::new(Some(tx))),
            closed: Arc::new(AtomicBool::new(false)),
        };

        if !self.manual {
            for event in self.stored.lock().iter().filter(|e| recorded.matches(e)) {
                recorded.send(RelayMessage::Event(event.clone()));
            }
            recorded.send(RelayMessage::EndOfStoredEvents);
        }

        let subscription = MockSubscription {
            receiver: rx,
            closed: Arc::clone(&recorded.closed),
        };
        self.subscriptions.lock().push(recorded);
        Ok(Box::new(subscription))
    }
}

/// A relay pool that refuses every subscription.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRelayPool;

impl RelayPool for FailingRelayPool {
    fn subscribe(
        &self,
        _relay_urls: &[String],
        _filters: Vec<Filter>,
    ) -> Result<Box<dyn RelaySubscription>, Error> {
        Err(Error::Pool("no relay reachable".into()))
    }
}
