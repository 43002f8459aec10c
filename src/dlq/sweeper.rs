//! Retention sweeper.
//!
//! # Responsibilities
//! - Periodically purge resolved entries older than the retention window

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::dlq::DeadLetterQueue;

pub struct RetentionSweeper {
    queue: Arc<DeadLetterQueue>,
}

impl RetentionSweeper {
    pub fn new(queue: Arc<DeadLetterQueue>) -> Self {
        Self { queue }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let interval = self.queue.config().sweep_interval().max(Duration::from_secs(1));
        tracing::info!(
            interval_secs = interval.as_secs(),
            retention_days = self.queue.config().retention_days,
            "Retention sweeper starting"
        );

        let mut ticker = time::interval(interval);
        // First tick fires immediately; skip it so startup doesn't rewrite the file.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.queue.purge_resolved();
                    tracing::debug!(purged, "Retention sweep finished");
                }
                _ = shutdown.recv() => {
                    tracing::info!("Retention sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
