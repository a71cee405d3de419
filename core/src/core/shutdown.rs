//! Centralized shutdown management
//!
//! Coordinates cooperative shutdown of the Consumer Loop (§5 Cancellation &
//! timeouts): a triggered shutdown stops new dispatch, and registered
//! background tasks are given a bounded grace period to finish or release
//! the message they currently hold before the process gives up on them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// Centralized shutdown service for coordinating graceful shutdown
#[derive(Clone)]
pub struct ShutdownService {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
    grace_period: Duration,
}

impl ShutdownService {
    pub fn new(grace_period: Duration) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            handles: Arc::new(Mutex::new(Vec::new())),
            grace_period,
        }
    }

    /// Register a background task handle to be awaited during shutdown
    pub async fn register(&self, handle: JoinHandle<()>) {
        self.handles.lock().await.push(handle);
    }

    /// Subscribe to the shutdown signal
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.rx.clone()
    }

    /// Trigger shutdown
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Check if shutdown was triggered
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Trigger shutdown and wait for all registered tasks to finish their
    /// current unit of work, up to the configured grace period. A task still
    /// running after the grace period is abandoned rather than killed: the
    /// Consumer Loop leaves its in-flight message unacknowledged so another
    /// replica's claim-stale pass picks it back up (§4.6, §4.8).
    pub async fn shutdown(&self) {
        tracing::debug!("Initiating graceful shutdown...");
        self.trigger();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        let task_count = handles.len();
        tracing::debug!(
            count = task_count,
            grace_secs = self.grace_period.as_secs(),
            "Waiting for background tasks to finish..."
        );

        match tokio::time::timeout(self.grace_period, futures::future::join_all(handles)).await {
            Ok(_) => {
                tracing::debug!("All background tasks completed");
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = self.grace_period.as_secs(),
                    "Grace period elapsed with background tasks still running"
                );
            }
        }

        tracing::debug!("Shutdown complete");
    }

    /// Wait for the shutdown signal (for use with axum graceful shutdown)
    pub fn wait(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let _ = rx.wait_for(|&v| v).await;
        }
    }

    /// Install OS signal handlers and auto-trigger on Ctrl+C/SIGTERM
    pub fn install_signal_handlers(&self) {
        let service = self.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::debug!("Received Ctrl+C, shutting down"),
                _ = terminate => tracing::debug!("Received SIGTERM, shutting down"),
            }

            service.trigger();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_shutdown() -> ShutdownService {
        ShutdownService::new(Duration::from_millis(200))
    }

    #[tokio::test]
    async fn not_triggered_initially() {
        let shutdown = make_shutdown();
        assert!(!shutdown.is_triggered());
    }

    #[tokio::test]
    async fn trigger_sets_flag() {
        let shutdown = make_shutdown();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn wait_returns_after_trigger() {
        let shutdown = make_shutdown();
        let wait_future = shutdown.wait();

        let handle = tokio::spawn(wait_future);
        tokio::task::yield_now().await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn subscriber_receives_shutdown() {
        let shutdown = make_shutdown();
        let rx = shutdown.subscribe();

        assert!(!*rx.borrow());
        shutdown.trigger();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn shutdown_awaits_registered_task_within_grace_period() {
        let shutdown = make_shutdown();
        let completed = Arc::new(Mutex::new(false));
        let completed_clone = completed.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            *completed_clone.lock().await = true;
        });
        shutdown.register(handle).await;

        shutdown.shutdown().await;
        assert!(*completed.lock().await);
    }
}
