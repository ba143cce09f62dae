//! Tracking for detached background work.
//!
//! # Responsibilities
//! - Run work that outlives the request that issued it
//! - Contain panics inside that work (logged, never propagated)
//! - Let shutdown wait until all outstanding work has finished
//!
//! # Design Decisions
//! - Outstanding count is decremented by a drop guard and released exactly
//!   once, even if the runtime cancels the task
//! - Waiters are woken through `Notify` when the count reaches zero

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Notify;

use crate::http::response::panic_message;
use crate::observability::metrics;

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Runs and counts fire-and-forget tasks.
///
/// Cheap to clone; clones share the same count.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTaskTracker {
    inner: Arc<Inner>,
}

impl BackgroundTaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on its own Tokio task.
    ///
    /// A panic inside `task` is caught and logged; it reaches neither the
    /// caller nor the runtime.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = TaskGuard::new(Arc::clone(&self.inner));

        tokio::spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(()) => {
                    metrics::record_background_task("completed");
                    tracing::trace!(task = name, "Background task completed");
                }
                Err(payload) => {
                    metrics::record_background_task("panicked");
                    tracing::error!(
                        task = name,
                        panic = %panic_message(&*payload),
                        "Background task panicked"
                    );
                }
            }
        });
    }

    /// Number of tasks spawned and not yet finished.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Wait until no tasks are outstanding.
    ///
    /// Tasks spawned after this returns are not covered; callers stop new
    /// spawns before relying on it.
    pub async fn wait(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            // Register before checking so a wake-up between the load and
            // the await is not lost.
            idle.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            idle.await;
        }
    }
}

/// Holds one unit of the outstanding count.
struct TaskGuard {
    inner: Arc<Inner>,
}

impl TaskGuard {
    fn new(inner: Arc<Inner>) -> Self {
        let outstanding = inner.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::set_background_tasks_outstanding(outstanding);
        Self { inner }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let remaining = self.inner.outstanding.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_background_tasks_outstanding(remaining);
        if remaining == 0 {
            self.inner.idle.notify_waiters();
        }
    }
}
