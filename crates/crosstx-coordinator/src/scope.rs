use std::fmt::Debug;
use std::future::Future;

use crosstx_adapters::{AppendOnlyStore, RelationalBackend};
use crosstx_core::{Metadata, TransactionId};
use tracing::warn;

use crate::coordinator::TransactionCoordinator;
use crate::error::{CoordinatorError, ScopeError};
use crate::report::CommitOutcome;

impl<R: RelationalBackend, A: AppendOnlyStore> TransactionCoordinator<R, A> {
    /// Run `work` inside a new transaction.
    ///
    /// The transaction commits when `work` returns `Ok` and rolls back when
    /// it returns `Err`, in which case the caller's error is handed back as
    /// [`ScopeError::Work`]. A failed rollback is reported instead of the
    /// caller's error.
    ///
    /// A panic inside `work` leaves the transaction in flight until it is
    /// rolled back explicitly or by the expiry sweep.
    pub async fn transaction<T, E, F, Fut>(
        &self,
        metadata: Metadata,
        work: F,
    ) -> Result<T, ScopeError<E>>
    where
        E: Debug,
        F: FnOnce(TransactionId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let transaction_id = self.begin_transaction(metadata);

        let value = match work(transaction_id).await {
            Ok(value) => value,
            Err(error) => {
                warn!(transaction = %transaction_id, ?error, "transaction work failed");
                self.rollback_transaction(transaction_id)
                    .await
                    .map_err(ScopeError::Coordinator)?;
                return Err(ScopeError::Work(error));
            }
        };

        let outcome = self
            .commit_transaction_with_report(transaction_id)
            .await
            .map_err(ScopeError::Coordinator)?;
        match outcome {
            CommitOutcome::Committed => Ok(value),
            CommitOutcome::Refused { failed_operations } => {
                self.rollback_transaction(transaction_id)
                    .await
                    .map_err(ScopeError::Coordinator)?;
                Err(ScopeError::Coordinator(CoordinatorError::CommitRefused {
                    transaction_id,
                    failed_operations,
                }))
            }
            CommitOutcome::RolledBack { commit_error, .. } => {
                Err(ScopeError::Coordinator(CoordinatorError::CommitFailed {
                    transaction_id,
                    source: commit_error,
                }))
            }
        }
    }
}
