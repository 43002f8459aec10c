//! Auto-recovery monitor.
//!
//! # Responsibilities
//! - Periodically ask the manager whether it may step down a level

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::degradation::DegradationManager;

pub struct RecoveryMonitor {
    manager: Arc<DegradationManager>,
}

impl RecoveryMonitor {
    pub fn new(manager: Arc<DegradationManager>) -> Self {
        Self { manager }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let interval = self
            .manager
            .config()
            .recovery_check_interval()
            .max(Duration::from_secs(1));
        tracing::info!(interval_secs = interval.as_secs(), "Recovery monitor starting");

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(level) = self.manager.check_recovery() {
                        tracing::debug!(level = %level, "Recovery monitor stepped service level down");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Recovery monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
