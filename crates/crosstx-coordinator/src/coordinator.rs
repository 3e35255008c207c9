use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crosstx_adapters::{
    AppendOnlyStore, AppendOnlyStoreAdapter, CorrectionHandler, NativeRollbackHandler,
    RelationalBackend, RelationalStoreAdapter, RestorationHandler, SharedSession,
    TombstoneHandler,
};
use crosstx_core::{
    Clock, CompensationData, Metadata, Operation, OperationId, OperationKind, OperationState,
    SystemClock, Transaction, TransactionId, TransactionState,
};
use crosstx_saga::{
    CompensationAuditLog, CompensationError, CompensationHandler, CompensationRegistry,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::report::{CommitOutcome, RollbackReport};

const ABORTED_BY_ROLLBACK: &str = "aborted by rollback";
const NATIVE_ROLLBACK_FAILED: &str = "native rollback failed";

/// Coordinates transactions spanning a relational store and an append-only store.
///
/// Relational operations share one native session per transaction and are
/// committed or rolled back atomically. Append-only writes cannot be rolled
/// back, so on rollback each completed operation is handed to the
/// [`CompensationHandler`] registered for its kind, newest first.
///
/// Only one caller should drive a given transaction at a time. Different
/// transactions may be driven concurrently from any number of tasks.
pub struct TransactionCoordinator<R: RelationalBackend, A: AppendOnlyStore> {
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
    transactions: Mutex<HashMap<TransactionId, Transaction>>,
    relational: RelationalStoreAdapter<R>,
    append_only: Arc<AppendOnlyStoreAdapter<A>>,
    registry: RwLock<CompensationRegistry>,
}

impl<R: RelationalBackend, A: AppendOnlyStore> TransactionCoordinator<R, A> {
    /// Coordinator with the default configuration and the system clock.
    #[must_use]
    pub fn new(relational: R, append_only: A) -> Self {
        Self::build(
            relational,
            append_only,
            CoordinatorConfig::default(),
            Arc::new(SystemClock),
        )
    }

    pub fn with_config(
        relational: R,
        append_only: A,
        config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(relational, append_only, config, clock))
    }

    fn build(
        relational: R,
        append_only: A,
        config: CoordinatorConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let append_only = Arc::new(AppendOnlyStoreAdapter::new(
            append_only,
            config.streams.clone(),
            Arc::clone(&clock),
        ));
        let registry = default_registry(&append_only);

        Self {
            config,
            clock,
            transactions: Mutex::new(HashMap::new()),
            relational: RelationalStoreAdapter::new(relational),
            append_only,
            registry: RwLock::new(registry),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[must_use]
    pub fn relational(&self) -> &RelationalStoreAdapter<R> {
        &self.relational
    }

    #[must_use]
    pub fn append_only(&self) -> &Arc<AppendOnlyStoreAdapter<A>> {
        &self.append_only
    }

    /// The native session relational writes of `transaction_id` go through.
    #[must_use]
    pub fn relational_session(
        &self,
        transaction_id: TransactionId,
    ) -> Option<SharedSession<R::Session>> {
        self.relational.session(transaction_id)
    }

    /// Register `handler` for `kind`, replacing the current one.
    pub fn register_handler(
        &self,
        kind: OperationKind,
        handler: Arc<dyn CompensationHandler>,
    ) -> Option<Arc<dyn CompensationHandler>> {
        debug!(%kind, handler = handler.name(), "registering compensation handler");
        self.registry.write().register(kind, handler)
    }

    pub fn unregister_handler(&self, kind: OperationKind) -> Option<Arc<dyn CompensationHandler>> {
        self.registry.write().unregister(kind)
    }

    #[must_use]
    pub fn registered_kinds(&self) -> Vec<OperationKind> {
        self.registry.read().registered_kinds()
    }

    pub fn begin_transaction(&self, metadata: Metadata) -> TransactionId {
        self.begin_transaction_with_timeout(metadata, self.config.default_timeout())
    }

    pub fn begin_transaction_with_timeout(
        &self,
        metadata: Metadata,
        timeout: Duration,
    ) -> TransactionId {
        let mut transaction = Transaction::new(metadata, self.clock.now(), timeout);
        transaction.state = TransactionState::Active;
        let id = transaction.id;

        self.transactions.lock().insert(id, transaction);
        info!(transaction = %id, timeout_secs = timeout.as_secs(), "began transaction");
        id
    }

    /// Append a new operation to the transaction.
    ///
    /// Relational operations open the transaction's native session on first
    /// use and start out `Executing`. Append-only operations start `Pending`
    /// and touch nothing until the caller writes.
    pub async fn add_operation(
        &self,
        transaction_id: TransactionId,
        kind: OperationKind,
        metadata: Metadata,
    ) -> Result<OperationId> {
        let operation_id = {
            let mut transactions = self.transactions.lock();
            let transaction = transactions
                .get_mut(&transaction_id)
                .ok_or(CoordinatorError::TransactionNotFound(transaction_id))?;
            let operation = Operation::new(kind, metadata, self.clock.now());
            let id = operation.id;
            transaction.operations.push(operation);
            id
        };
        debug!(transaction = %transaction_id, operation = %operation_id, %kind, "added operation");

        if !kind.is_relational() {
            return Ok(operation_id);
        }

        match self.relational.begin_operation(transaction_id).await {
            Ok(_) => {
                let found = self
                    .update_operation(transaction_id, operation_id, |op| {
                        op.mark_executing();
                        Ok(())
                    })
                    .is_ok();
                if !found {
                    // rolled back while the session was opening
                    self.relational.release(transaction_id);
                    return Err(CoordinatorError::TransactionNotFound(transaction_id));
                }
                Ok(operation_id)
            }
            Err(source) => {
                warn!(
                    transaction = %transaction_id,
                    operation = %operation_id,
                    error = %source,
                    "could not open native session"
                );
                let now = self.clock.now();
                // a vanished transaction has nothing left to mark
                let _ = self.update_operation(transaction_id, operation_id, |op| {
                    op.mark_failed(source.to_string(), now);
                    Ok(())
                });
                Err(CoordinatorError::SessionUnavailable {
                    transaction_id,
                    source,
                })
            }
        }
    }

    /// Store what a later compensation needs to undo the operation.
    pub fn attach_compensation_data(
        &self,
        transaction_id: TransactionId,
        operation_id: OperationId,
        data: CompensationData,
    ) -> Result<()> {
        self.update_operation(transaction_id, operation_id, |op| {
            op.compensation_data = data;
            Ok(())
        })
    }

    pub fn complete_operation(
        &self,
        transaction_id: TransactionId,
        operation_id: OperationId,
    ) -> Result<()> {
        let now = self.clock.now();
        self.update_operation(transaction_id, operation_id, |op| {
            ensure_open(op, OperationState::Completed)?;
            op.mark_completed(now);
            Ok(())
        })?;
        debug!(transaction = %transaction_id, operation = %operation_id, "operation completed");
        Ok(())
    }

    pub fn fail_operation(
        &self,
        transaction_id: TransactionId,
        operation_id: OperationId,
        error: impl Into<String>,
    ) -> Result<()> {
        let error = error.into();
        let now = self.clock.now();
        self.update_operation(transaction_id, operation_id, |op| {
            ensure_open(op, OperationState::Failed)?;
            op.mark_failed(error.clone(), now);
            Ok(())
        })?;
        warn!(transaction = %transaction_id, operation = %operation_id, %error, "operation failed");
        Ok(())
    }

    fn update_operation<T>(
        &self,
        transaction_id: TransactionId,
        operation_id: OperationId,
        update: impl FnOnce(&mut Operation) -> Result<T>,
    ) -> Result<T> {
        let mut transactions = self.transactions.lock();
        let transaction = transactions
            .get_mut(&transaction_id)
            .ok_or(CoordinatorError::TransactionNotFound(transaction_id))?;
        let operation = transaction.operation_mut(operation_id).ok_or(
            CoordinatorError::OperationNotFound {
                transaction_id,
                operation_id,
            },
        )?;
        update(operation)
    }

    /// Commit the transaction, returning whether it committed.
    ///
    /// See [`commit_transaction_with_report`](Self::commit_transaction_with_report).
    pub async fn commit_transaction(&self, transaction_id: TransactionId) -> Result<bool> {
        Ok(self
            .commit_transaction_with_report(transaction_id)
            .await?
            .is_committed())
    }

    /// Commit the transaction.
    ///
    /// A transaction with failed operations is refused and left untouched.
    /// Otherwise it leaves the set of in-flight transactions before the
    /// native commit starts, so neither an expiry sweep nor a concurrent
    /// rollback can compensate work that is being committed. If the native
    /// commit fails, the transaction is rolled back before this returns.
    pub async fn commit_transaction_with_report(
        &self,
        transaction_id: TransactionId,
    ) -> Result<CommitOutcome> {
        let mut transaction = {
            let mut transactions = self.transactions.lock();
            let failed_operations = transactions
                .get(&transaction_id)
                .map(Transaction::failed_operations)
                .ok_or(CoordinatorError::TransactionNotFound(transaction_id))?;
            if !failed_operations.is_empty() {
                warn!(
                    transaction = %transaction_id,
                    failed = failed_operations.len(),
                    "refusing to commit transaction with failed operations"
                );
                return Ok(CommitOutcome::Refused { failed_operations });
            }
            transactions
                .remove(&transaction_id)
                .ok_or(CoordinatorError::TransactionNotFound(transaction_id))?
        };

        match self.relational.commit(transaction_id).await {
            Ok(had_session) => {
                transaction.state = TransactionState::Committed;
                for op in &transaction.operations {
                    self.append_only.discard(op.id);
                }
                info!(
                    transaction = %transaction_id,
                    operations = transaction.operations.len(),
                    native = had_session,
                    "committed transaction"
                );
                Ok(CommitOutcome::Committed)
            }
            Err(commit_error) => {
                error!(
                    transaction = %transaction_id,
                    error = %commit_error,
                    "native commit failed, rolling back"
                );
                let report = match self.roll_back(transaction).await {
                    Ok(report) => report,
                    Err(CoordinatorError::RollbackFailed { report, .. }) => *report,
                    Err(other) => return Err(other),
                };
                Ok(CommitOutcome::RolledBack {
                    commit_error,
                    report,
                })
            }
        }
    }

    /// Roll the transaction back.
    ///
    /// The native session is rolled back first, then every completed
    /// operation is compensated newest first. Compensation failures are
    /// recorded in the report and do not stop the remaining compensations.
    /// Returns `Ok(None)` if the transaction is unknown, already finished,
    /// or currently committing.
    ///
    /// An operation whose compensation only partly applied carries what is
    /// still owed in its compensation data, so passing the operation from
    /// the report to [`compensate_operation`](Self::compensate_operation)
    /// retries just that part.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::RollbackFailed`] if the native rollback
    /// failed. The transaction is then `Failed`, and its relational
    /// operations are left for manual reconciliation. The append-only
    /// compensations have still run by then; the report carries their
    /// outcome.
    pub async fn rollback_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<RollbackReport>> {
        let taken = self.transactions.lock().remove(&transaction_id);
        let Some(transaction) = taken else {
            debug!(transaction = %transaction_id, "nothing to roll back");
            return Ok(None);
        };
        self.roll_back(transaction).await.map(Some)
    }

    async fn roll_back(&self, mut transaction: Transaction) -> Result<RollbackReport> {
        let transaction_id = transaction.id;
        info!(
            transaction = %transaction_id,
            operations = transaction.operations.len(),
            "rolling back transaction"
        );

        let native_error = self.relational.rollback(transaction_id).await.err();
        if let Some(err) = &native_error {
            error!(transaction = %transaction_id, error = %err, "native rollback failed");
        }

        let now = self.clock.now();
        let mut audit = CompensationAuditLog::new();
        for op in transaction.operations.iter_mut().rev() {
            let state = op.state;
            match state {
                OperationState::Completed if native_error.is_some() && op.kind.is_relational() => {
                    audit.record_start(op.id, op.kind);
                    audit.record_skipped(NATIVE_ROLLBACK_FAILED.to_string());
                }
                OperationState::Completed => {
                    audit.record_start(op.id, op.kind);
                    match self.run_compensation(op).await {
                        (Some(description), Ok(())) => audit.record_compensated(description),
                        (_, Err(CompensationError::Unregistered { .. })) | (None, Ok(())) => {
                            audit.record_unregistered();
                        }
                        (description, Err(err)) => audit
                            .record_failed(description.unwrap_or_default(), err.to_string()),
                    }
                }
                OperationState::Executing if native_error.is_none() => {
                    op.mark_failed(ABORTED_BY_ROLLBACK, now);
                }
                _ => {}
            }
        }

        transaction.state = if native_error.is_some() {
            TransactionState::Failed
        } else {
            TransactionState::RolledBack
        };

        self.relational.release(transaction_id);
        for op in &transaction.operations {
            self.append_only.discard(op.id);
        }

        let report = RollbackReport {
            transaction_id,
            state: transaction.state,
            operations: transaction.operations,
            audit,
        };
        if report.needs_reconciliation() {
            warn!(
                transaction = %transaction_id,
                state = %report.state,
                unreconciled = report.audit.unreconciled().len(),
                "rollback left operations needing manual reconciliation"
            );
        }
        info!(transaction = %transaction_id, state = %report.state, "rollback finished");

        match native_error {
            Some(source) => Err(CoordinatorError::RollbackFailed {
                transaction_id,
                source,
                report: Box::new(report),
            }),
            None => Ok(report),
        }
    }

    /// Compensate one completed operation with the handler registered for its kind.
    ///
    /// On success the operation becomes `Compensated`. Otherwise it stays
    /// `Completed`; if the handler got partway, its compensation data is
    /// replaced by what is still owed.
    pub async fn compensate_operation(
        &self,
        operation: &mut Operation,
    ) -> std::result::Result<(), CompensationError> {
        self.run_compensation(operation).await.1
    }

    async fn run_compensation(
        &self,
        operation: &mut Operation,
    ) -> (Option<String>, std::result::Result<(), CompensationError>) {
        let handler = self.registry.read().get_handler(operation.kind);
        let Some(handler) = handler else {
            warn!(
                operation = %operation.id,
                kind = %operation.kind,
                "no compensation handler registered, operation needs manual reconciliation"
            );
            return (
                None,
                Err(CompensationError::Unregistered {
                    operation_id: operation.id,
                    kind: operation.kind,
                }),
            );
        };

        let description = handler.compensation_description();
        match handler.compensate(operation).await {
            Ok(()) => {
                operation.mark_compensated();
                debug!(
                    operation = %operation.id,
                    handler = handler.name(),
                    "compensated operation"
                );
                (Some(description), Ok(()))
            }
            Err(err) => {
                error!(
                    operation = %operation.id,
                    handler = handler.name(),
                    error = %err,
                    "compensation failed, operation needs manual reconciliation"
                );
                if let Some(remaining) = err.remaining() {
                    operation.compensation_data = remaining.clone();
                }
                (Some(description), Err(err))
            }
        }
    }

    /// Snapshot of a transaction still in flight.
    #[must_use]
    pub fn transaction_snapshot(&self, transaction_id: TransactionId) -> Option<Transaction> {
        self.transactions.lock().get(&transaction_id).cloned()
    }

    #[must_use]
    pub fn transaction_state(&self, transaction_id: TransactionId) -> Option<TransactionState> {
        self.transactions
            .lock()
            .get(&transaction_id)
            .map(|transaction| transaction.state)
    }

    /// Ids of every transaction in flight, oldest first.
    #[must_use]
    pub fn active_transactions(&self) -> Vec<TransactionId> {
        let transactions = self.transactions.lock();
        let mut active: Vec<_> = transactions
            .values()
            .map(|transaction| (transaction.created_at, transaction.id))
            .collect();
        active.sort();
        active.into_iter().map(|(_, id)| id).collect()
    }

    pub fn is_expired(&self, transaction_id: TransactionId) -> Result<bool> {
        let now = self.clock.now();
        self.transactions
            .lock()
            .get(&transaction_id)
            .map(|transaction| transaction.is_expired_at(now))
            .ok_or(CoordinatorError::TransactionNotFound(transaction_id))
    }
}

fn ensure_open(operation: &Operation, requested: OperationState) -> Result<()> {
    if operation.state.is_open() {
        Ok(())
    } else {
        Err(CoordinatorError::InvalidOperationState {
            operation_id: operation.id,
            state: operation.state,
            requested,
        })
    }
}

fn default_registry<A: AppendOnlyStore>(
    append_only: &Arc<AppendOnlyStoreAdapter<A>>,
) -> CompensationRegistry {
    let mut registry = CompensationRegistry::new();
    let native: Arc<dyn CompensationHandler> = Arc::new(NativeRollbackHandler);
    registry.register(OperationKind::RelationalWrite, Arc::clone(&native));
    registry.register(OperationKind::RelationalRead, native);
    registry.register(
        OperationKind::AppendOnlyInsert,
        Arc::new(TombstoneHandler::new(Arc::clone(append_only))),
    );
    registry.register(
        OperationKind::AppendOnlyUpdate,
        Arc::new(CorrectionHandler::new(Arc::clone(append_only))),
    );
    registry.register(
        OperationKind::AppendOnlyDelete,
        Arc::new(RestorationHandler::new(Arc::clone(append_only))),
    );
    registry
}
