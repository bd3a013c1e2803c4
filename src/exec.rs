//! Execution contexts for user callbacks.

use tokio::sync::mpsc;

type Task = Box<dyn FnOnce() + Send>;

/// Handle to a task queue that runs posted closures in order. Callback sinks
/// are always invoked on the `Handler` supplied at registration time, never
/// on the manager's own task.
#[derive(Clone, Debug)]
pub struct Handler {
    tx: mpsc::UnboundedSender<Task>,
}

impl Handler {
    /// Creates a new execution context backed by a spawned task. The task
    /// exits when the last `Handler` clone is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                task();
            }
        });
        Self { tx }
    }

    /// Posts a closure for execution. Posts from a single thread run in
    /// order. A post to a stopped context is silently discarded.
    #[inline]
    pub fn post(&self, f: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(f));
    }
}

impl Default for Handler {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn posts_run_in_order() {
        let h = Handler::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..3 {
            let tx = tx.clone();
            h.post(move || {
                let _ = tx.send(i);
            });
        }
        for i in 0..3 {
            assert_eq!(rx.recv().await, Some(i));
        }
    }
}
