//! Periodic jobs that force time-based transitions.
//!
//! Candidates are listed outside any unit of work, then each row is settled
//! in its own unit of work; a failing row is logged and counted without
//! stopping the batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::services::rewards::RewardsService;
use crate::services::transactions::{confirmation_window, TransactionService};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub candidates: usize,
    pub settled: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    transactions: TransactionService,
    rewards: RewardsService,
}

impl Sweeper {
    pub fn new(transactions: TransactionService, rewards: RewardsService) -> Self {
        Self {
            transactions,
            rewards,
        }
    }

    /// Expires `PENDING_PAYMENT` transactions past their payment deadline.
    pub async fn expire_overdue_payments(&self, now: DateTime<Utc>) -> Result<SweepReport, AppError> {
        let ids = self.transactions.store().overdue_payments(now).await?;
        let mut report = SweepReport {
            candidates: ids.len(),
            ..SweepReport::default()
        };

        for id in ids {
            match self.transactions.expire_by_deadline(id, now).await {
                Ok(Some(_)) => report.settled += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(transaction_id = %id, error = %e, "Failed to expire transaction");
                }
            }
        }

        if report.candidates > 0 {
            info!(?report, "Overdue payment sweep finished");
        }
        Ok(report)
    }

    /// Cancels `PENDING_CONFIRMATION` transactions the organizer left idle.
    pub async fn cancel_stale_confirmations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, AppError> {
        let cutoff = now - confirmation_window();
        let ids = self.transactions.store().stale_confirmations(cutoff).await?;
        let mut report = SweepReport {
            candidates: ids.len(),
            ..SweepReport::default()
        };

        for id in ids {
            match self.transactions.expire_by_inactivity(id, now).await {
                Ok(Some(_)) => report.settled += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(transaction_id = %id, error = %e, "Failed to cancel stale transaction");
                }
            }
        }

        if report.candidates > 0 {
            info!(?report, "Stale confirmation sweep finished");
        }
        Ok(report)
    }

    /// Runs every sweep once. Errors are logged per job.
    pub async fn run_once(&self, now: DateTime<Utc>) {
        if let Err(e) = self.expire_overdue_payments(now).await {
            error!(error = %e, "Overdue payment sweep failed");
        }
        if let Err(e) = self.cancel_stale_confirmations(now).await {
            error!(error = %e, "Stale confirmation sweep failed");
        }
        if let Err(e) = self.rewards.expire_idle_points(now).await {
            error!(error = %e, "Points expiry sweep failed");
        }
    }

    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = every.as_secs(), "Sweepers started");

            loop {
                ticker.tick().await;
                self.run_once(Utc::now()).await;
            }
        })
    }
}
