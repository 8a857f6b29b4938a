//! Handle for a cancellable background loop

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned background loop together with its cancellation token
///
/// The token is a child of the token passed to [`BackgroundTask::spawn`], so
/// cancelling the process-wide token stops every task, while
/// [`BackgroundTask::shutdown`] stops just this one. The join handle is the
/// completion signal: shutdown returns only once the loop has finished its
/// in-flight work and returned.
///
/// # Example
/// ```rust
/// use event_bus::BackgroundTask;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let root = CancellationToken::new();
/// let task = BackgroundTask::spawn("ticker", &root, |cancel| async move {
///     cancel.cancelled().await;
/// });
/// task.shutdown().await;
/// # }
/// ```
pub struct BackgroundTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub fn spawn<F, Fut>(name: &'static str, parent: &CancellationToken, run: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run(cancel.clone()));

        tracing::info!(task = name, "Background task started");

        Self {
            name,
            cancel,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal cancellation and wait for the loop to return
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for the loop to return without signalling it
    pub async fn join(self) {
        match self.handle.await {
            Ok(()) => tracing::info!(task = self.name, "Background task stopped"),
            Err(e) if e.is_panic() => {
                tracing::error!(task = self.name, error = %e, "Background task panicked")
            }
            Err(e) => tracing::warn!(task = self.name, error = %e, "Background task aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_work() {
        let root = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let task = BackgroundTask::spawn("slow", &root, |cancel| async move {
            cancel.cancelled().await;
            // Work that must complete after the signal
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        task.shutdown().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_task() {
        let root = CancellationToken::new();
        let task = BackgroundTask::spawn("child", &root, |cancel| async move {
            cancel.cancelled().await;
        });

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), task.join())
            .await
            .expect("task should stop when the parent token is cancelled");
    }

    #[tokio::test]
    async fn test_shutdown_does_not_cancel_parent() {
        let root = CancellationToken::new();
        let task = BackgroundTask::spawn("one", &root, |cancel| async move {
            cancel.cancelled().await;
        });
        assert_eq!(task.name(), "one");

        task.shutdown().await;
        assert!(!root.is_cancelled());
    }
}
