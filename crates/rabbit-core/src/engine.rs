//! Caller-facing entry point.
//!
//! [`BatchedEventsEngine`] wires the [`BatchScheduler`], the
//! [`BatchDispatcher`] and the [`EngineStats`] gauge together. UI code only
//! creates [`BatchedEventsTask`]s, registers them here, and awaits their
//! accessors.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = BatchedEventsEngine::builder()
//!     .relay_url("wss://relay.example.com")
//!     .batch_interval(Duration::from_millis(2000))
//!     .build(pool)?;
//!
//! let cancel = CancellationToken::new();
//! let task = Arc::new(BatchedEventsTask::new(RequestDescriptor::Reactions {
//!     mentioned_event_id: note_id,
//! }));
//! engine.register_task(Arc::clone(&task), Some(cancel.clone()));
//!
//! // Dropping the view before the window closes:
//! cancel.cancel();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::dispatcher::BatchDispatcher;
use crate::error::Error;
use crate::pool::RelayPool;
use crate::scheduler::{BatchExecutor, BatchScheduler, FlushReason};
use crate::stats::{sample_active_subscriptions, EngineStats};
use crate::task::BatchedEventsTask;

// ---------------------------------------------------------------------------
// BatchedEventsEngine
// ---------------------------------------------------------------------------

/// Batches [`BatchedEventsTask`]s into relay subscriptions.
///
/// Dropping the engine dispatches whatever is left in the open window and
/// stops the background timers. Subscriptions that are already open keep
/// running until their end-of-stream.
pub struct BatchedEventsEngine {
    scheduler: Arc<BatchScheduler<BatchedEventsTask>>,
    dispatcher: Arc<BatchDispatcher>,
    stats: Arc<EngineStats>,
    gauge: watch::Receiver<usize>,
    runtime: Handle,
    timer: JoinHandle<()>,
    sampler: JoinHandle<()>,
}

impl BatchedEventsEngine {
    /// Returns a builder with default configuration.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Creates an engine and starts its flush timer and gauge sampler.
    ///
    /// # Errors
    ///
    /// [`Error::NoRuntime`] if called outside a tokio runtime.
    pub fn new(config: EngineConfig, pool: Arc<dyn RelayPool>) -> Result<Self, Error> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let stats = Arc::new(EngineStats::new());

        let dispatcher = Arc::new(BatchDispatcher::new(
            pool,
            config.relay_urls,
            Arc::clone(&stats),
            runtime.clone(),
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            config.batch,
            Arc::clone(&dispatcher) as Arc<dyn BatchExecutor<BatchedEventsTask>>,
        ));
        let timer = scheduler.start(&runtime);

        let (gauge_tx, gauge) = watch::channel(0);
        let sampler = runtime.spawn(sample_active_subscriptions(
            Arc::downgrade(&stats),
            gauge_tx,
            config.stats_interval,
        ));

        Ok(Self {
            scheduler,
            dispatcher,
            stats,
            gauge,
            runtime,
            timer,
            sampler,
        })
    }

    /// Submits `task` to the current window.
    ///
    /// If `signal` fires while the task's window is still open, the task is
    /// never dispatched; it stays [`Pending`](crate::TaskState::Pending)
    /// and the caller treats it as cancelled. Once the window has been
    /// dispatched the signal has no effect and the task completes normally.
    /// A signal that has already fired skips registration entirely.
    pub fn register_task(&self, task: Arc<BatchedEventsTask>, signal: Option<CancellationToken>) {
        if signal.as_ref().is_some_and(CancellationToken::is_cancelled) {
            tracing::debug!(task = %task.id(), "task cancelled before registration");
            self.stats.task_cancelled();
            return;
        }

        let Some(signal) = signal else {
            self.scheduler.add_task(task, None);
            return;
        };
        let window_sealed = self
            .scheduler
            .add_task(Arc::clone(&task), Some(signal.clone()));

        // Eager removal; the seal drops a cancelled entry either way.
        let scheduler = Arc::downgrade(&self.scheduler);
        let stats = Arc::clone(&self.stats);
        self.runtime.spawn(async move {
            tokio::select! {
                biased;
                () = window_sealed.cancelled() => {}
                () = signal.cancelled() => {
                    let removed = scheduler
                        .upgrade()
                        .is_some_and(|scheduler| scheduler.remove_task(&task));
                    if removed {
                        tracing::debug!(task = %task.id(), "task cancelled before dispatch");
                        stats.task_cancelled();
                    }
                }
            }
        });
    }

    /// Dispatches the open window now, if it is non-empty.
    ///
    /// Returns the number of tasks dispatched.
    pub fn flush(&self) -> usize {
        self.scheduler.flush(FlushReason::Manual)
    }

    /// Returns the number of tasks waiting in the open window.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    /// Returns the engine counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.stats
    }

    /// Returns a receiver of the periodically sampled count of open batch
    /// subscriptions.
    #[must_use]
    pub fn active_subscriptions(&self) -> watch::Receiver<usize> {
        self.gauge.clone()
    }

    /// Returns the relays new batches subscribe to.
    #[must_use]
    pub fn relay_urls(&self) -> Vec<String> {
        self.dispatcher.relay_urls()
    }

    /// Replaces the relay list for batches dispatched from now on.
    pub fn set_relay_urls(&self, relay_urls: Vec<String>) {
        self.dispatcher.set_relay_urls(relay_urls);
    }

    /// Returns the scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<BatchScheduler<BatchedEventsTask>> {
        &self.scheduler
    }
}

impl Drop for BatchedEventsEngine {
    fn drop(&mut self) {
        self.scheduler.flush(FlushReason::Manual);
        self.timer.abort();
        self.sampler.abort();
    }
}

// ---------------------------------------------------------------------------
// EngineBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for [`BatchedEventsEngine`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = BatchedEventsEngine::builder()
///     .relay_urls(["wss://a.example.com", "wss://b.example.com"])
///     .batch_size(100)
///     .build(pool)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a relay.
    #[must_use]
    pub fn relay_url(mut self, url: impl Into<String>) -> Self {
        self.config.relay_urls.push(url.into());
        self
    }

    /// Adds several relays.
    #[must_use]
    pub fn relay_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .relay_urls
            .extend(urls.into_iter().map(Into::into));
        self
    }

    /// Sets the window period.
    #[must_use]
    pub fn batch_interval(mut self, interval: Duration) -> Self {
        self.config.batch.interval = interval;
        self
    }

    /// Sets the window capacity.
    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch.batch_size = size;
        self
    }

    /// Sets the gauge sampling period.
    #[must_use]
    pub fn stats_interval(mut self, interval: Duration) -> Self {
        self.config.stats_interval = interval;
        self
    }

    /// Returns the configuration built so far.
    #[must_use]
    pub fn build_config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the engine on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::NoRuntime`] if called outside a tokio runtime.
    pub fn build(self, pool: Arc<dyn RelayPool>) -> Result<BatchedEventsEngine, Error> {
        BatchedEventsEngine::new(self.config, pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::testing::MockRelayPool;

    #[test]
    fn test_builder_config() {
        let builder = EngineBuilder::new()
            .relay_url("wss://a")
            .relay_urls(["wss://b", "wss://c"])
            .batch_interval(Duration::from_millis(500))
            .batch_size(10)
            .stats_interval(Duration::from_secs(5));

        assert_eq!(
            *builder.build_config(),
            EngineConfig {
                relay_urls: vec!["wss://a".into(), "wss://b".into(), "wss://c".into()],
                batch: BatchConfig {
                    interval: Duration::from_millis(500),
                    batch_size: 10,
                },
                stats_interval: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = EngineBuilder::new().build(Arc::new(MockRelayPool::new()));
        assert!(matches!(result, Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn test_set_relay_urls() {
        let engine = EngineBuilder::new()
            .relay_url("wss://a")
            .build(Arc::new(MockRelayPool::new()))
            .unwrap();
        assert_eq!(engine.relay_urls(), vec!["wss://a".to_string()]);

        engine.set_relay_urls(vec!["wss://b".into()]);
        assert_eq!(engine.relay_urls(), vec!["wss://b".to_string()]);
    }
}
