use std::sync::Arc;

use tokio::{
    sync::Notify,
    time::{Duration, MissedTickBehavior, interval},
};

use crate::store::{ReconcileReport, ReviewStore, StoreResult};

/// Background pass that rebuilds review counters from ledger entries.
pub struct ReconciliationJob<S> {
    store: Arc<S>,
    trigger: Arc<Notify>,
    period: Duration,
}

impl<S: ReviewStore> ReconciliationJob<S> {
    pub fn new(store: Arc<S>, trigger: Arc<Notify>, period: Duration) -> Self {
        Self {
            store,
            trigger,
            period,
        }
    }

    /// Runs one pass and logs what it repaired. A review whose repair fails
    /// is logged and left for the next pass; the rest are still repaired.
    pub async fn run_once(&self) -> StoreResult<ReconcileReport> {
        let candidates = self.store.drifted_reviews().await?;
        let mut report = ReconcileReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        for review_id in candidates {
            match self.store.reconcile_review(review_id).await {
                Ok(true) => report.repaired.push(review_id),
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(%review_id, error = %e, "Failed to reconcile review counters");
                    report.failed.push(review_id);
                }
            }
        }

        if report.repaired.is_empty() && report.failed.is_empty() {
            tracing::debug!(scanned = report.scanned, "Reconciliation found no drift");
        } else {
            tracing::warn!(
                scanned = report.scanned,
                repaired = report.repaired.len(),
                failed = report.failed.len(),
                "Reconciliation repaired review counters"
            );
        }

        Ok(report)
    }

    /// Spawns the loop: one pass every `period`, and one as soon as the vote
    /// flow reports a partial failure.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.trigger.notified() => {
                        tracing::info!("Reconciliation requested by vote flow");
                    }
                }

                if let Err(e) = self.run_once().await {
                    tracing::error!("Failed to reconcile review counters: {}", e);
                }
            }
        })
    }
}
