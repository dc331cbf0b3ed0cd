//! Batch dispatcher: one relay subscription per sealed batch.
//!
//! For every batch handed over by the [`BatchScheduler`](crate::BatchScheduler)
//! the dispatcher:
//!
//! 1. **Builds** a [`RequestBuilder`] and its merged filters.
//! 2. **Subscribes** once on the [`RelayPool`] with those filters.
//! 3. **Resolves** every inbound event into the builder.
//! 4. **Completes** every task of the batch on end-of-stream and closes the
//!    subscription.
//!
//! ```text
//! BatchScheduler          BatchDispatcher                    RelayPool
//! ┌──────────────┐ batch  ┌─────────────────────┐ subscribe  ┌──────────┐
//! │ sealed window│──────► │ RequestBuilder      │──────────► │          │
//! └──────────────┘        │  resolve(event) ◄───┼─── event ──│  relays  │
//!                         │  complete all   ◄───┼─── EOSE ───│          │
//!                         └─────────────────────┘            └──────────┘
//! ```
//!
//! The dispatcher never retries and never reopens a subscription. If the pool
//! drops a subscription without signalling end-of-stream, the batch's tasks
//! stay incomplete.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;

use crate::pool::{RelayMessage, RelayPool, RelaySubscription};
use crate::request::RequestBuilder;
use crate::scheduler::BatchExecutor;
use crate::stats::EngineStats;
use crate::task::BatchedEventsTask;

/// Executes sealed batches of [`BatchedEventsTask`]s against a relay pool.
pub struct BatchDispatcher {
    pool: Arc<dyn RelayPool>,
    /// Relays used for subscriptions opened from now on.
    relay_urls: RwLock<Vec<String>>,
    stats: Arc<EngineStats>,
    runtime: Handle,
}

impl BatchDispatcher {
    /// Creates a dispatcher that drives its subscriptions on `runtime`.
    #[must_use]
    pub fn new(
        pool: Arc<dyn RelayPool>,
        relay_urls: Vec<String>,
        stats: Arc<EngineStats>,
        runtime: Handle,
    ) -> Self {
        Self {
            pool,
            relay_urls: RwLock::new(relay_urls),
            stats,
            runtime,
        }
    }

    /// Returns the relays new subscriptions are opened against.
    #[must_use]
    pub fn relay_urls(&self) -> Vec<String> {
        self.relay_urls.read().clone()
    }

    /// Replaces the relay list for batches dispatched from now on.
    pub fn set_relay_urls(&self, relay_urls: Vec<String>) {
        *self.relay_urls.write() = relay_urls;
    }

    /// Returns the shared stats.
    #[must_use]
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }
}

impl BatchExecutor<BatchedEventsTask> for BatchDispatcher {
    fn execute(&self, batch: Vec<Arc<BatchedEventsTask>>) {
        self.stats.batch_dispatched(batch.len());

        let builder = RequestBuilder::from_tasks(&batch);
        let filters = builder.build_filters();
        if filters.is_empty() {
            complete_all(&batch);
            return;
        }

        let relay_urls = self.relay_urls();
        tracing::debug!(
            tasks = batch.len(),
            filters = filters.len(),
            relays = relay_urls.len(),
            "opening batch subscription"
        );

        let subscription = match self.pool.subscribe(&relay_urls, filters) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(error = %e, tasks = batch.len(), "failed to open batch subscription");
                complete_all(&batch);
                return;
            }
        };

        self.stats.subscription_opened();
        self.runtime.spawn(drive_subscription(
            subscription,
            builder,
            batch,
            Arc::clone(&self.stats),
        ));
    }

    fn cancelled(&self, task: &Arc<BatchedEventsTask>) {
        tracing::debug!(task = %task.id(), "task cancelled before dispatch");
        self.stats.task_cancelled();
    }
}

fn complete_all(batch: &[Arc<BatchedEventsTask>]) {
    for task in batch {
        task.complete();
    }
}

/// Streams `subscription` into `builder` until end-of-stream.
async fn drive_subscription(
    mut subscription: Box<dyn RelaySubscription>,
    builder: RequestBuilder,
    batch: Vec<Arc<BatchedEventsTask>>,
    stats: Arc<EngineStats>,
) {
    while let Some(message) = subscription.next_message().await {
        match message {
            RelayMessage::Event(event) => {
                let matched = builder.resolve(&event);
                if !matched {
                    tracing::trace!(id = %event.id, kind = event.kind, "event matched no task");
                }
                stats.event_received(matched);
            }
            RelayMessage::EndOfStoredEvents => {
                complete_all(&batch);
                subscription.close();
                stats.subscription_closed();
                tracing::debug!(tasks = batch.len(), "batch subscription finished");
                return;
            }
        }
    }

    tracing::warn!(
        tasks = batch.len(),
        "batch subscription ended without end-of-stream; tasks left incomplete"
    );
    subscription.close();
    stats.subscription_closed();
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{kind, Event};
    use crate::filter::Filter;
    use crate::task::{RequestDescriptor, TaskState};
    use crate::testing::{FailingRelayPool, MockRelayPool};

    fn make_event(id: &str, pubkey: &str, event_kind: u32, created_at: u64) -> Event {
        Event {
            id: id.into(),
            pubkey: pubkey.into(),
            created_at,
            kind: event_kind,
            tags: Vec::new(),
            content: String::new(),
            sig: String::new(),
        }
    }

    fn profile(pubkey: &str) -> Arc<BatchedEventsTask> {
        Arc::new(BatchedEventsTask::new(RequestDescriptor::Profile {
            pubkey: pubkey.into(),
        }))
    }

    fn make_dispatcher(pool: Arc<dyn RelayPool>) -> BatchDispatcher {
        BatchDispatcher::new(
            pool,
            vec!["wss://relay.example.com".into()],
            Arc::new(EngineStats::new()),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_dispatch_resolves_and_completes() {
        let pool = Arc::new(MockRelayPool::new());
        pool.store(make_event("m1", "alice", kind::METADATA, 10));
        pool.store(make_event("m2", "alice", kind::METADATA, 20));
        pool.store(make_event("m3", "bob", kind::METADATA, 30));

        let dispatcher = make_dispatcher(Arc::clone(&pool) as Arc<dyn RelayPool>);
        let a = profile("alice");
        let b = profile("alice");
        dispatcher.execute(vec![Arc::clone(&a), Arc::clone(&b)]);

        assert_eq!(a.latest_event().await.unwrap().id, "m2");
        assert_eq!(b.completion().await.unwrap().unwrap().len(), 2);

        let subs = pool.subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(
            subs[0].filters,
            vec![Filter::new().kinds([kind::METADATA]).authors(["alice"])]
        );
        assert_eq!(subs[0].relay_urls, vec!["wss://relay.example.com".to_string()]);

        tokio::task::yield_now().await;
        assert!(subs[0].is_closed());
        assert_eq!(dispatcher.stats().active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_gauge_tracks_open_subscription() {
        let pool = Arc::new(MockRelayPool::manual());
        let dispatcher = make_dispatcher(Arc::clone(&pool) as Arc<dyn RelayPool>);
        let task = profile("alice");
        dispatcher.execute(vec![Arc::clone(&task)]);
        assert_eq!(dispatcher.stats().active_subscriptions(), 1);

        let sub = pool.subscriptions().remove(0);
        sub.send(RelayMessage::Event(make_event("m", "alice", kind::METADATA, 1)));
        sub.send(RelayMessage::EndOfStoredEvents);

        assert_eq!(task.latest_event().await.unwrap().id, "m");
        tokio::task::yield_now().await;
        assert_eq!(dispatcher.stats().active_subscriptions(), 0);
        assert_eq!(dispatcher.stats().snapshot().events_received, 1);
    }

    #[tokio::test]
    async fn test_stream_end_without_eose_leaves_tasks_pending() {
        let pool = Arc::new(MockRelayPool::manual());
        let dispatcher = make_dispatcher(Arc::clone(&pool) as Arc<dyn RelayPool>);
        let task = profile("alice");
        dispatcher.execute(vec![Arc::clone(&task)]);

        let sub = pool.subscriptions().remove(0);
        sub.send(RelayMessage::Event(make_event("m", "alice", kind::METADATA, 1)));
        sub.disconnect();

        task.first_event().await.unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(task.state(), TaskState::Updated);
        assert_eq!(dispatcher.stats().active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_completes_tasks() {
        let dispatcher = make_dispatcher(Arc::new(FailingRelayPool));
        let task = profile("alice");
        dispatcher.execute(vec![Arc::clone(&task)]);

        assert_eq!(task.state(), TaskState::Completed);
        assert_eq!(dispatcher.stats().active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_set_relay_urls_applies_to_next_batch() {
        let pool = Arc::new(MockRelayPool::new());
        let dispatcher = make_dispatcher(Arc::clone(&pool) as Arc<dyn RelayPool>);
        dispatcher.set_relay_urls(vec!["wss://other.example.com".into()]);
        dispatcher.execute(vec![profile("alice")]);

        assert_eq!(
            pool.subscriptions()[0].relay_urls,
            vec!["wss://other.example.com".to_string()]
        );
    }
}
