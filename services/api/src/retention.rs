//! Scheduled purge of orders that stayed in the recycle bin too long

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::repositories::OrderRepository;

/// Recycle-bin sweeper
#[derive(Clone)]
pub struct RetentionSweeper {
    order_repository: OrderRepository,
    retention_days: i64,
}

impl RetentionSweeper {
    pub fn new(order_repository: OrderRepository, retention_days: i64) -> Self {
        Self {
            order_repository,
            retention_days,
        }
    }

    /// Orders soft-deleted at or before this instant are due; `None` when the
    /// retention period reaches past the representable time range
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        now.checked_sub_signed(TimeDelta::try_days(self.retention_days)?)
    }

    /// Run one sweep, returning the number of purged orders
    pub async fn sweep(&self) -> Result<u64> {
        let cutoff = self.cutoff(Utc::now()).with_context(|| {
            format!("Retention of {} days is out of range", self.retention_days)
        })?;
        let purged = self.order_repository.purge_deleted_before(cutoff).await?;
        info!(
            "Permanently deleted {} order(s) soft-deleted before {}",
            purged, cutoff
        );
        Ok(purged)
    }

    /// Schedule the sweep; returns the running scheduler, which must be kept alive
    pub async fn start(&self, schedule: &str) -> Result<JobScheduler> {
        if self.cutoff(Utc::now()).is_none() {
            anyhow::bail!("Retention of {} days is out of range", self.retention_days);
        }
        let sweeper = self.clone();

        let scheduler = JobScheduler::new().await?;

        let job = Job::new_async(schedule, move |_, _| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                if let Err(e) = sweeper.sweep().await {
                    error!("Recycle bin sweep failed: {}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        scheduler.start().await?;

        info!(
            "Started recycle bin sweeper with schedule '{}' ({} day retention)",
            schedule, self.retention_days
        );
        Ok(scheduler)
    }
}
