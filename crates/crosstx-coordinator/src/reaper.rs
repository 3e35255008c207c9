use std::sync::{Arc, Weak};
use std::time::Duration;

use crosstx_adapters::{AppendOnlyStore, RelationalBackend};
use crosstx_core::TransactionId;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::coordinator::TransactionCoordinator;
use crate::error::CoordinatorError;

/// Transactions handled by one expiry sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpirySweep {
    pub rolled_back: Vec<TransactionId>,
    /// Transactions whose native rollback failed; they end up `Failed`.
    pub failed: Vec<TransactionId>,
}

impl ExpirySweep {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rolled_back.is_empty() && self.failed.is_empty()
    }
}

impl<R: RelationalBackend, A: AppendOnlyStore> TransactionCoordinator<R, A> {
    /// Ids of in-flight transactions that outlived their timeout, oldest first.
    #[must_use]
    pub fn expired_transactions(&self) -> Vec<TransactionId> {
        self.active_transactions()
            .into_iter()
            .filter(|id| self.is_expired(*id).unwrap_or(false))
            .collect()
    }

    /// Roll back every expired transaction.
    pub async fn rollback_expired(&self) -> ExpirySweep {
        let mut sweep = ExpirySweep::default();
        for transaction_id in self.expired_transactions() {
            match self.rollback_transaction(transaction_id).await {
                Ok(Some(_)) => sweep.rolled_back.push(transaction_id),
                // finished by its owner in the meantime
                Ok(None) => {}
                Err(CoordinatorError::RollbackFailed { source, .. }) => {
                    warn!(
                        transaction = %transaction_id,
                        error = %source,
                        "rollback of expired transaction failed"
                    );
                    sweep.failed.push(transaction_id);
                }
                Err(err) => {
                    warn!(transaction = %transaction_id, error = %err, "could not sweep transaction");
                    sweep.failed.push(transaction_id);
                }
            }
        }

        if !sweep.is_empty() {
            info!(
                rolled_back = sweep.rolled_back.len(),
                failed = sweep.failed.len(),
                "rolled back expired transactions"
            );
        }
        sweep
    }

    /// Sweep expired transactions every `period` on the current Tokio runtime.
    ///
    /// The task holds only a weak reference and stops once the coordinator
    /// is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let coordinator: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    debug!("coordinator dropped, stopping reaper");
                    break;
                };
                coordinator.rollback_expired().await;
            }
        })
    }

    /// Spawn the reaper if the configuration enables it.
    pub fn start_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let reaper = &self.config().reaper;
        if !reaper.enabled {
            return None;
        }
        info!(interval_secs = reaper.interval_secs, "starting expiry reaper");
        Some(self.spawn_reaper(reaper.interval()))
    }
}
