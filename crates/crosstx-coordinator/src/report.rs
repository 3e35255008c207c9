use crosstx_core::{Operation, OperationId, OperationState, StoreError, TransactionId, TransactionState};
use crosstx_saga::CompensationAuditLog;

/// What a rollback did to a transaction.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub transaction_id: TransactionId,
    /// `RolledBack`, or `Failed` when the native rollback raised.
    pub state: TransactionState,
    /// Operations as they were left, in append order.
    pub operations: Vec<Operation>,
    /// Compensations in the order they ran (newest operation first).
    pub audit: CompensationAuditLog,
}

impl RollbackReport {
    /// Operations still `Completed` after the rollback.
    #[must_use]
    pub fn uncompensated(&self) -> Vec<OperationId> {
        self.operations
            .iter()
            .filter(|op| op.state == OperationState::Completed)
            .map(|op| op.id)
            .collect()
    }

    #[must_use]
    pub fn needs_reconciliation(&self) -> bool {
        self.state == TransactionState::Failed || !self.uncompensated().is_empty()
    }

    #[must_use]
    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }
}

/// Result of asking the coordinator to commit.
#[derive(Debug)]
pub enum CommitOutcome {
    Committed,
    /// Nothing was touched because these operations had failed.
    Refused { failed_operations: Vec<OperationId> },
    /// The native commit raised and the transaction was rolled back.
    RolledBack {
        commit_error: StoreError,
        report: RollbackReport,
    },
}

impl CommitOutcome {
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Final state of the transaction, if this outcome ended it.
    #[must_use]
    pub fn final_state(&self) -> Option<TransactionState> {
        match self {
            Self::Committed => Some(TransactionState::Committed),
            Self::Refused { .. } => None,
            Self::RolledBack { report, .. } => Some(report.state),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use crosstx_core::{Metadata, OperationKind};

    use super::*;

    fn report(state: TransactionState, operations: Vec<Operation>) -> RollbackReport {
        RollbackReport {
            transaction_id: TransactionId::new(),
            state,
            operations,
            audit: CompensationAuditLog::new(),
        }
    }

    #[test]
    fn fully_compensated_rollback_needs_no_reconciliation() {
        let mut op = Operation::new(OperationKind::AppendOnlyInsert, Metadata::new(), Utc::now());
        op.mark_completed(Utc::now());
        op.mark_compensated();

        let report = report(TransactionState::RolledBack, vec![op]);

        assert!(report.uncompensated().is_empty());
        assert!(!report.needs_reconciliation());
    }

    #[test]
    fn completed_operation_left_behind_needs_reconciliation() {
        let mut op = Operation::new(OperationKind::AppendOnlyUpdate, Metadata::new(), Utc::now());
        op.mark_completed(Utc::now());
        let id = op.id;

        let report = report(TransactionState::RolledBack, vec![op]);

        assert_eq!(report.uncompensated(), vec![id]);
        assert!(report.needs_reconciliation());
        assert!(report.operation(id).is_some());
    }

    #[test]
    fn failed_rollback_always_needs_reconciliation() {
        assert!(report(TransactionState::Failed, Vec::new()).needs_reconciliation());
    }

    #[test]
    fn commit_outcome_final_states() {
        assert!(CommitOutcome::Committed.is_committed());
        assert_eq!(
            CommitOutcome::Committed.final_state(),
            Some(TransactionState::Committed)
        );
        let refused = CommitOutcome::Refused {
            failed_operations: vec![OperationId::new()],
        };
        assert!(!refused.is_committed());
        assert_eq!(refused.final_state(), None);
        let rolled_back = CommitOutcome::RolledBack {
            commit_error: StoreError::Relational("commit rejected".to_string()),
            report: report(TransactionState::RolledBack, Vec::new()),
        };
        assert_eq!(rolled_back.final_state(), Some(TransactionState::RolledBack));
    }
}
