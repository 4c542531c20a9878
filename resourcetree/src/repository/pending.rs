//! Callbacks waiting for background leaf refreshes.
//!
//! Leaves may be refreshed asynchronously by their owners (a file watcher, a
//! build sync). The owner brackets each refresh with
//! [`RepositoryTree::begin_pending_update`] and
//! [`RepositoryTree::finish_pending_update`]; callers that need a settled view
//! register a callback with
//! [`RepositoryTree::invoke_after_pending_updates_finish`].
//!
//! Waiters are collected while the tree lock is held but always dispatched
//! after it is released, so a callback may query the tree.
//!
//! [`RepositoryTree::begin_pending_update`]: super::RepositoryTree::begin_pending_update
//! [`RepositoryTree::finish_pending_update`]: super::RepositoryTree::finish_pending_update
//! [`RepositoryTree::invoke_after_pending_updates_finish`]: super::RepositoryTree::invoke_after_pending_updates_finish

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A unit of work handed to an [`Executor`].
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs callbacks.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Callback);
}

/// Runs callbacks on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Callback) {
        task();
    }
}

/// Runs callbacks on the runtime's blocking pool.
impl Executor for tokio::runtime::Handle {
    fn execute(&self, task: Callback) {
        drop(self.spawn_blocking(task));
    }
}

/// A callback and the executor it must run on.
pub(crate) struct PendingWaiter {
    executor: Arc<dyn Executor>,
    callback: Callback,
}

impl PendingWaiter {
    pub(crate) fn new(executor: Arc<dyn Executor>, callback: Callback) -> Self {
        Self { executor, callback }
    }

    /// Hand the callback to its executor. Must not be called with the tree
    /// lock held.
    pub(crate) fn dispatch(self) {
        self.executor.execute(self.callback);
    }

    /// Split this waiter into `count` inline waiters; the original is
    /// dispatched once all of them have run.
    pub(crate) fn fan_in(self, count: usize) -> Vec<PendingWaiter> {
        let remaining = Arc::new(AtomicUsize::new(count));
        let target = Arc::new(Mutex::new(Some(self)));
        (0..count)
            .map(|_| {
                let remaining = Arc::clone(&remaining);
                let target = Arc::clone(&target);
                PendingWaiter::new(
                    Arc::new(DirectExecutor),
                    Box::new(move || {
                        if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                            if let Some(waiter) = target.lock().take() {
                                waiter.dispatch();
                            }
                        }
                    }),
                )
            })
            .collect()
    }
}

impl std::fmt::Debug for PendingWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingWaiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_waiter(counter: &Arc<AtomicUsize>) -> PendingWaiter {
        let counter = Arc::clone(counter);
        PendingWaiter::new(
            Arc::new(DirectExecutor),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_direct_executor_runs_inline() {
        let counter = Arc::new(AtomicUsize::new(0));
        counting_waiter(&counter).dispatch();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_fan_in_runs_once_after_all_parts() {
        let counter = Arc::new(AtomicUsize::new(0));
        let parts = counting_waiter(&counter).fan_in(3);
        assert_eq!(parts.len(), 3);

        let mut parts = parts.into_iter();
        parts.next().unwrap().dispatch();
        parts.next().unwrap().dispatch();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        parts.next().unwrap().dispatch();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tokio_handle_executor() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let handle = tokio::runtime::Handle::current();
        handle.execute(Box::new(move || {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
