use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tokio::time::Duration;
use tracing::{debug, error, info, instrument};

use shared_config::AppConfig;
use shared_models::Clock;

use crate::error::WaitlistError;
use crate::models::SweepReport;
use crate::services::waitlist::WaitlistEngine;

/// Background task that periodically expires overdue entries and retries
/// failed notifications.
pub struct WaitlistSweeper {
    engine: Arc<WaitlistEngine>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    is_shutdown: RwLock<bool>,
    wake: Notify,
}

impl WaitlistSweeper {
    pub fn new(engine: Arc<WaitlistEngine>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        Self::with_interval(
            engine,
            clock,
            Duration::from_secs(config.waitlist_sweep_interval_seconds.max(1)),
        )
    }

    pub fn with_interval(
        engine: Arc<WaitlistEngine>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            clock,
            interval,
            is_shutdown: RwLock::new(false),
            wake: Notify::new(),
        }
    }

    /// Runs until `shutdown` is called. A failed sweep is logged and the
    /// next one runs on schedule.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), WaitlistError> {
        info!("Starting waitlist sweeper (every {:?})", self.interval);

        loop {
            if *self.is_shutdown.read().await {
                debug!("Waitlist sweeper received shutdown signal");
                break;
            }

            match self.run_once().await {
                Ok(report) if !report.is_empty() => info!(
                    "Waitlist sweep expired {} entries, retried {} notifications",
                    report.expired.len(),
                    report.retried.len()
                ),
                Ok(_) => debug!("Waitlist sweep found nothing to do"),
                Err(e) => error!("Waitlist sweep failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.wake.notified() => {}
            }
        }

        info!("Waitlist sweeper stopped");
        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Initiating waitlist sweeper shutdown");
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
        self.wake.notify_one();
    }

    pub async fn run_once(&self) -> Result<SweepReport, WaitlistError> {
        let today = self.clock.today();
        let expired = self.engine.expire_overdue(today).await?;
        let retried = self.engine.retry_pending_notifications().await?;
        Ok(SweepReport { expired, retried })
    }
}
