//! Windowed batch scheduling.
//!
//! Tasks registered within a short window are collected and handed to a
//! [`BatchExecutor`] as one batch.
//!
//! # Flush Triggers
//!
//! The current window is sealed and dispatched when either:
//! - it reaches `batch_size` tasks (size trigger, on [`BatchScheduler::add_task`])
//! - the repeating timer fires while it is non-empty (time trigger)
//!
//! Exactly one dispatch happens per window. A fresh window starts as soon
//! as the previous one is sealed.
//!
//! # Cancellation
//!
//! A task may be registered with a [`CancellationToken`]. Entries whose
//! token has fired are dropped when their window is sealed, so a signal that
//! fires before dispatch always keeps the task out of the batch.
//! [`BatchScheduler::remove_task`] removes an entry eagerly. Both only affect
//! the open window: once a window has been sealed its tasks belong to the
//! executor.
//!
//! Every window carries a token of its own that is cancelled when the window
//! is sealed or dropped. [`BatchScheduler::add_task`] returns it, so a
//! watcher can stop as soon as its task has left the window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::BatchConfig;

// ---------------------------------------------------------------------------
// BatchExecutor
// ---------------------------------------------------------------------------

/// Receives sealed batches from a [`BatchScheduler`].
///
/// Called outside the window lock; implementations must not block.
pub trait BatchExecutor<T>: Send + Sync {
    /// Executes one sealed, non-empty batch.
    fn execute(&self, batch: Vec<Arc<T>>);

    /// Called for each task dropped from a window because its cancellation
    /// token fired before the window was sealed.
    fn cancelled(&self, _task: &Arc<T>) {}
}

// ---------------------------------------------------------------------------
// FlushReason
// ---------------------------------------------------------------------------

/// Why a window was sealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The window reached `batch_size`.
    Size,
    /// The flush timer fired.
    Timer,
    /// [`BatchScheduler::flush`] was called directly.
    Manual,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Size => write!(f, "size"),
            Self::Timer => write!(f, "timer"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

struct Entry<T> {
    task: Arc<T>,
    signal: Option<CancellationToken>,
}

impl<T> Entry<T> {
    fn is_cancelled(&self) -> bool {
        self.signal
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// The open window. Dropping it cancels its `sealed` token.
struct Window<T> {
    entries: Vec<Entry<T>>,
    sealed: CancellationToken,
    _guard: DropGuard,
}

impl<T> Window<T> {
    fn with_capacity(capacity: usize) -> Self {
        let sealed = CancellationToken::new();
        Self {
            entries: Vec::with_capacity(capacity),
            _guard: sealed.clone().drop_guard(),
            sealed,
        }
    }
}

/// Tasks taken out of a sealed window.
struct Sealed<T> {
    batch: Vec<Arc<T>>,
    cancelled: Vec<Arc<T>>,
}

// ---------------------------------------------------------------------------
// BatchScheduler
// ---------------------------------------------------------------------------

/// Collects tasks into windows and dispatches each window once.
pub struct BatchScheduler<T> {
    config: BatchConfig,
    /// Tasks of the open window, in registration order.
    window: Mutex<Window<T>>,
    executor: Arc<dyn BatchExecutor<T>>,
    /// Number of windows dispatched so far.
    windows_sealed: AtomicU64,
}

impl<T: Send + Sync + 'static> BatchScheduler<T> {
    /// Creates a scheduler feeding `executor`.
    ///
    /// The time trigger only runs once [`start`](Self::start) is called.
    #[must_use]
    pub fn new(config: BatchConfig, executor: Arc<dyn BatchExecutor<T>>) -> Self {
        Self {
            window: Mutex::new(Window::with_capacity(config.batch_size)),
            config,
            executor,
            windows_sealed: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Returns the number of tasks in the open window.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.window.lock().entries.len()
    }

    /// Returns the number of non-empty windows dispatched so far.
    #[must_use]
    pub fn windows_sealed(&self) -> u64 {
        self.windows_sealed.load(Ordering::Relaxed)
    }

    /// Adds `task` to the open window.
    ///
    /// If `signal` has fired by the time the window is sealed, the task is
    /// left out of the batch. Seals and dispatches the window immediately if
    /// it reaches `batch_size`.
    ///
    /// Returns a token that is cancelled once the task's window has been
    /// sealed or dropped.
    pub fn add_task(&self, task: Arc<T>, signal: Option<CancellationToken>) -> CancellationToken {
        let (window_sealed, sealed) = {
            let mut window = self.window.lock();
            window.entries.push(Entry { task, signal });
            let window_sealed = window.sealed.clone();
            let sealed = (window.entries.len() >= self.config.batch_size.max(1))
                .then(|| self.seal(&mut window));
            (window_sealed, sealed)
        };

        if let Some(sealed) = sealed {
            self.dispatch(sealed, FlushReason::Size);
        }
        window_sealed
    }

    /// Removes `task` from the open window.
    ///
    /// Returns `false` if the task is not in the open window, which
    /// includes tasks whose window has already been dispatched.
    pub fn remove_task(&self, task: &Arc<T>) -> bool {
        let mut window = self.window.lock();
        match window
            .entries
            .iter()
            .position(|entry| Arc::ptr_eq(&entry.task, task))
        {
            Some(pos) => {
                window.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Seals the open window and dispatches it if any task survives.
    ///
    /// Returns the number of tasks dispatched.
    pub fn flush(&self, reason: FlushReason) -> usize {
        let sealed = {
            let mut window = self.window.lock();
            if window.entries.is_empty() {
                return 0;
            }
            self.seal(&mut window)
        };

        let len = sealed.batch.len();
        self.dispatch(sealed, reason);
        len
    }

    /// Starts the repeating flush timer.
    ///
    /// The timer runs on `runtime`, holds a weak reference and stops once
    /// the scheduler is dropped.
    pub fn start(self: &Arc<Self>, runtime: &Handle) -> JoinHandle<()> {
        runtime.spawn(run_timer(Arc::downgrade(self)))
    }

    fn seal(&self, window: &mut Window<T>) -> Sealed<T> {
        let old = std::mem::replace(window, Window::with_capacity(self.config.batch_size));
        let (cancelled, batch): (Vec<_>, Vec<_>) =
            old.entries.into_iter().partition(Entry::is_cancelled);
        Sealed {
            batch: batch.into_iter().map(|entry| entry.task).collect(),
            cancelled: cancelled.into_iter().map(|entry| entry.task).collect(),
        }
    }

    fn dispatch(&self, sealed: Sealed<T>, reason: FlushReason) {
        for task in &sealed.cancelled {
            self.executor.cancelled(task);
        }
        if sealed.batch.is_empty() {
            tracing::debug!(%reason, cancelled = sealed.cancelled.len(), "sealed window left empty");
            return;
        }

        self.windows_sealed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            %reason,
            tasks = sealed.batch.len(),
            cancelled = sealed.cancelled.len(),
            "dispatching batch"
        );
        self.executor.execute(sealed.batch);
    }
}

async fn run_timer<T: Send + Sync + 'static>(scheduler: Weak<BatchScheduler<T>>) {
    let period = match scheduler.upgrade() {
        Some(scheduler) => scheduler.config.interval.max(Duration::from_millis(1)),
        None => return,
    };
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(strong) = scheduler.upgrade() else {
            break;
        };
        strong.flush(FlushReason::Timer);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
