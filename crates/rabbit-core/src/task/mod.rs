//! Observable units of work.
//!
//! An [`ObservableTask`] carries an immutable request and accumulates a
//! result through [`update`](ObservableTask::update) calls until it is
//! [`complete`](ObservableTask::complete)d. Two observation points are
//! exposed:
//!
//! - [`first_update`](ObservableTask::first_update): the value as of the
//!   first update
//! - [`completion`](ObservableTask::completion): the final value
//!
//! # Lifecycle
//!
//! ```text
//!           update           complete
//! Pending ──────────► Updated ──────────► Completed
//!    │                  ▲  │
//!    │                  └──┘ update
//!    └──────────────────────────────────► Completed
//!                 complete (no result)
//! ```

mod batched;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::Error;

pub use batched::{parameterized_replaceable_key, BatchedEventsTask, RequestDescriptor, RequestKind};

// ---------------------------------------------------------------------------
// TaskId
// ---------------------------------------------------------------------------

/// Process-unique task identifier, assigned at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl TaskId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No result delivered yet.
    Pending,
    /// At least one result delivered; more may follow.
    Updated,
    /// Terminal; no further mutation.
    Completed,
}

// ---------------------------------------------------------------------------
// ObservableTask
// ---------------------------------------------------------------------------

struct TaskInner<V> {
    state: TaskState,
    value: Option<V>,
}

/// A single observable unit of work.
///
/// `R` is the request the task was created for, `V` the accumulated result.
pub struct ObservableTask<R, V> {
    id: TaskId,
    request: R,
    inner: Mutex<TaskInner<V>>,
    /// Fires once, with the value produced by the first update.
    first_update: watch::Sender<Option<V>>,
    /// Fires once, with the final (possibly absent) value.
    completion: watch::Sender<Option<Option<V>>>,
}

impl<R, V: Clone> ObservableTask<R, V> {
    /// Creates a pending task for `request`.
    #[must_use]
    pub fn with_request(request: R) -> Self {
        let (first_update, _) = watch::channel(None);
        let (completion, _) = watch::channel(None);
        Self {
            id: TaskId::next(),
            request,
            inner: Mutex::new(TaskInner {
                state: TaskState::Pending,
                value: None,
            }),
            first_update,
            completion,
        }
    }

    /// Returns the task id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the request this task was created for.
    #[must_use]
    pub fn request(&self) -> &R {
        &self.request
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    /// Returns a copy of the current accumulated value.
    #[must_use]
    pub fn value(&self) -> Option<V> {
        self.inner.lock().value.clone()
    }

    /// Applies `merge` to the accumulated value.
    ///
    /// `merge` receives the current value (`None` before the first update)
    /// and returns the new one. Returns `false` without calling `merge` if
    /// the task has already completed.
    pub fn update<F>(&self, merge: F) -> bool
    where
        F: FnOnce(Option<V>) -> V,
    {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Completed {
            tracing::trace!(task = %self.id, "update after completion ignored");
            return false;
        }

        let value = merge(inner.value.take());
        if inner.state == TaskState::Pending {
            inner.state = TaskState::Updated;
            self.first_update.send_replace(Some(value.clone()));
        }
        inner.value = Some(value);
        true
    }

    /// Finalizes the task with whatever value has accumulated.
    ///
    /// Returns `false` if the task was already completed.
    pub fn complete(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Completed {
            return false;
        }
        inner.state = TaskState::Completed;
        self.completion.send_replace(Some(inner.value.clone()));
        true
    }

    /// Waits for the first update and returns the value it produced.
    ///
    /// Resolves only if at least one update occurs: a task that completes
    /// without any update leaves this future pending forever, so callers
    /// that cannot rule that out should await [`completion`](Self::completion)
    /// instead or race the two.
    ///
    /// # Errors
    ///
    /// [`Error::TaskClosed`] if the signal channel closes first.
    pub async fn first_update(&self) -> Result<V, Error> {
        let mut rx = self.first_update.subscribe();
        let value = rx.wait_for(Option::is_some).await.map_err(|_| Error::TaskClosed)?;
        value.clone().ok_or(Error::TaskClosed)
    }

    /// Waits for completion and returns the final value.
    ///
    /// # Errors
    ///
    /// [`Error::TaskClosed`] if the signal channel closes first.
    pub async fn completion(&self) -> Result<Option<V>, Error> {
        let mut rx = self.completion.subscribe();
        let value = rx.wait_for(Option::is_some).await.map_err(|_| Error::TaskClosed)?;
        value.clone().ok_or(Error::TaskClosed)
    }
}

impl<R: std::fmt::Debug, V> std::fmt::Debug for ObservableTask<R, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableTask")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("state", &self.inner.lock().state)
            .finish_non_exhaustive()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    type CountTask = ObservableTask<&'static str, Vec<u32>>;

    fn push(task: &CountTask, n: u32) -> bool {
        task.update(|current| {
            let mut values = current.unwrap_or_default();
            values.push(n);
            values
        })
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = CountTask::with_request("a");
        let b = CountTask::with_request("b");
        assert_ne!(a.id(), b.id());
        assert_eq!(*a.request(), "a");
    }

    #[test]
    fn test_task_lifecycle() {
        let task = CountTask::with_request("req");
        assert_eq!(task.state(), TaskState::Pending);
        assert!(task.value().is_none());

        assert!(push(&task, 1));
        assert_eq!(task.state(), TaskState::Updated);
        assert!(push(&task, 2));
        assert_eq!(task.value(), Some(vec![1, 2]));

        assert!(task.complete());
        assert_eq!(task.state(), TaskState::Completed);
        assert!(!task.complete());

        // Completed tasks reject further updates.
        assert!(!push(&task, 3));
        assert_eq!(task.value(), Some(vec![1, 2]));
    }

    #[test]
    fn test_complete_without_updates() {
        let task = CountTask::with_request("req");
        assert!(task.complete());
        assert_eq!(task.state(), TaskState::Completed);
        assert!(task.value().is_none());
    }

    #[tokio::test]
    async fn test_first_update_keeps_first_value() {
        let task = CountTask::with_request("req");
        push(&task, 1);
        push(&task, 2);
        assert_eq!(task.first_update().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_completion_resolves_with_final_value() {
        let task = Arc::new(CountTask::with_request("req"));
        let waiter = {
            let task = Arc::clone(&task);
            tokio::spawn(async move { task.completion().await })
        };

        push(&task, 7);
        task.complete();

        assert_eq!(waiter.await.unwrap().unwrap(), Some(vec![7]));
    }

    #[tokio::test]
    async fn test_completion_with_absent_value() {
        let task = CountTask::with_request("req");
        task.complete();
        assert_eq!(task.completion().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_update_pending_when_completed_empty() {
        let task = CountTask::with_request("req");
        task.complete();
        let result = tokio::time::timeout(Duration::from_secs(60), task.first_update()).await;
        assert!(result.is_err());
    }
}
