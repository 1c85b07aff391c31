//! Background retention sweep
//!
//! A driver with retention enabled owns one task that periodically evicts keys that
//! have not been read or written within the configured TTL. The task holds only a weak
//! reference to the driver and exits when the driver is dropped or disposed.

use async_trait::async_trait;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::mpsc;

/// Something the sweep can expire
#[async_trait]
pub trait Expire: Send + Sync + 'static {
    fn name(&self) -> String;

    /// Evict stale keys; returns how many were removed
    async fn sweep(&self) -> usize;
}

/// Handle to a running sweep task
#[derive(Debug)]
pub struct RetentionHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl RetentionHandle {
    /// Signal the task to stop after its current sweep
    pub fn stop(self) {
        if let Err(e) = self.shutdown_tx.try_send(()) {
            tracing::debug!("Retention task already stopped: {}", e);
        }
    }
}

/// Spawn the sweep loop; must be called from within a tokio runtime
pub fn spawn_retention(target: Weak<dyn Expire>, interval: Duration) -> RetentionHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    let interval = interval.max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    tracing::debug!("Retention task shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    let Some(target) = target.upgrade() else {
                        tracing::debug!("Retention target dropped, stopping");
                        break;
                    };
                    let expired = target.sweep().await;
                    if expired > 0 {
                        tracing::info!("{}: retention expired {} key(s)", target.name(), expired);
                    }
                }
            }
        }
    });

    RetentionHandle { shutdown_tx }
}
