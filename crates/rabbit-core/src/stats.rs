//! Engine observability counters.
//!
//! One [`EngineStats`] is created per engine and shared by the scheduler and
//! the dispatcher. All reads and writes use `Ordering::Relaxed`; the numbers
//! are advisory, not transactional.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Shared atomic counters for the batching engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    /// Dispatcher subscriptions currently open.
    active_subscriptions: AtomicUsize,
    /// Batches handed to the dispatcher.
    batches_dispatched: AtomicU64,
    /// Tasks contained in dispatched batches.
    tasks_dispatched: AtomicU64,
    /// Tasks removed from their window before dispatch.
    tasks_cancelled: AtomicU64,
    /// Events received on batch subscriptions.
    events_received: AtomicU64,
    /// Received events that satisfied no task.
    events_unmatched: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Dispatcher subscriptions currently open.
    pub active_subscriptions: usize,
    /// Batches handed to the dispatcher.
    pub batches_dispatched: u64,
    /// Tasks contained in dispatched batches.
    pub tasks_dispatched: u64,
    /// Tasks removed from their window before dispatch.
    pub tasks_cancelled: u64,
    /// Events received on batch subscriptions.
    pub events_received: u64,
    /// Received events that satisfied no task.
    pub events_unmatched: u64,
}

impl EngineStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of open dispatcher subscriptions.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.active_subscriptions.load(Ordering::Relaxed)
    }

    pub(crate) fn subscription_opened(&self) {
        self.active_subscriptions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn subscription_closed(&self) {
        // Stays at zero after a reset while subscriptions were open.
        self.active_subscriptions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .ok();
    }

    pub(crate) fn batch_dispatched(&self, tasks: usize) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.tasks_dispatched
            .fetch_add(tasks as u64, Ordering::Relaxed);
    }

    pub(crate) fn task_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_received(&self, matched: bool) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
        if !matched {
            self.events_unmatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Takes a snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            active_subscriptions: self.active_subscriptions.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_unmatched: self.events_unmatched.load(Ordering::Relaxed),
        }
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        self.active_subscriptions.store(0, Ordering::Relaxed);
        self.batches_dispatched.store(0, Ordering::Relaxed);
        self.tasks_dispatched.store(0, Ordering::Relaxed);
        self.tasks_cancelled.store(0, Ordering::Relaxed);
        self.events_received.store(0, Ordering::Relaxed);
        self.events_unmatched.store(0, Ordering::Relaxed);
    }
}

/// Publishes the active subscription count into `gauge` every `period`.
///
/// Runs until `stats` is dropped or every receiver of `gauge` is gone.
/// Should be spawned as a tokio task.
pub async fn sample_active_subscriptions(
    stats: Weak<EngineStats>,
    gauge: watch::Sender<usize>,
    period: Duration,
) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(stats) = stats.upgrade() else {
            break;
        };
        let active = stats.active_subscriptions();
        tracing::trace!(active, "active batch subscriptions");
        if gauge.send(active).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_stats_counters() {
        let stats = EngineStats::new();
        stats.subscription_opened();
        stats.subscription_opened();
        stats.subscription_closed();
        stats.batch_dispatched(3);
        stats.task_cancelled();
        stats.event_received(true);
        stats.event_received(false);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                active_subscriptions: 1,
                batches_dispatched: 1,
                tasks_dispatched: 3,
                tasks_cancelled: 1,
                events_received: 2,
                events_unmatched: 1,
            }
        );
    }

    #[test]
    fn test_stats_reset() {
        let stats = EngineStats::new();
        stats.subscription_opened();
        stats.batch_dispatched(10);
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());

        // Closing after a reset does not wrap below zero.
        stats.subscription_closed();
        assert_eq!(stats.active_subscriptions(), 0);
    }

    #[test]
    fn test_extra_close_stays_at_zero() {
        let stats = EngineStats::new();
        stats.subscription_opened();
        stats.subscription_opened();
        for _ in 0..3 {
            stats.subscription_closed();
        }
        assert_eq!(stats.active_subscriptions(), 0);

        stats.subscription_opened();
        assert_eq!(stats.active_subscriptions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_publishes_gauge() {
        let stats = Arc::new(EngineStats::new());
        let (tx, mut rx) = watch::channel(0);
        let handle = tokio::spawn(sample_active_subscriptions(
            Arc::downgrade(&stats),
            tx,
            Duration::from_secs(1),
        ));

        stats.subscription_opened();
        stats.subscription_opened();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 2);

        drop(stats);
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.await.unwrap();
    }
}
