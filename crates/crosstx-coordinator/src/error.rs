use std::fmt::Debug;

use crosstx_core::{OperationId, OperationState, StoreError, TransactionId};
use thiserror::Error;

use crate::report::RollbackReport;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoordinatorError {
    #[error("transaction {0} not found")]
    TransactionNotFound(TransactionId),

    #[error("operation {operation_id} not found in transaction {transaction_id}")]
    OperationNotFound {
        transaction_id: TransactionId,
        operation_id: OperationId,
    },

    #[error("operation {operation_id} is already {state}, cannot mark it {requested}")]
    InvalidOperationState {
        operation_id: OperationId,
        state: OperationState,
        requested: OperationState,
    },

    #[error("could not open a native session for transaction {transaction_id}")]
    SessionUnavailable {
        transaction_id: TransactionId,
        #[source]
        source: StoreError,
    },

    #[error("commit of transaction {transaction_id} refused: {} operation(s) failed", failed_operations.len())]
    CommitRefused {
        transaction_id: TransactionId,
        failed_operations: Vec<OperationId>,
    },

    #[error("native commit of transaction {transaction_id} failed")]
    CommitFailed {
        transaction_id: TransactionId,
        #[source]
        source: StoreError,
    },

    /// The native rollback raised; the relational side may not be undone.
    #[error("native rollback of transaction {transaction_id} failed")]
    RollbackFailed {
        transaction_id: TransactionId,
        #[source]
        source: StoreError,
        report: Box<RollbackReport>,
    },

    #[error("invalid coordinator configuration")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Error from the scoped [`transaction`](crate::TransactionCoordinator::transaction) helper.
#[derive(Debug, Error)]
pub enum ScopeError<E: Debug> {
    /// The caller's work failed and the transaction was rolled back.
    #[error("transaction work failed")]
    Work(#[source] E),

    /// Begin, commit, or rollback failed.
    #[error(transparent)]
    Coordinator(CoordinatorError),
}

impl<E: Debug> ScopeError<E> {
    /// The caller's own error, if that is what ended the scope.
    pub fn into_work(self) -> Option<E> {
        match self {
            Self::Work(error) => Some(error),
            Self::Coordinator(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse coordinator config")]
    Parse(#[from] toml::de::Error),

    #[error("default_timeout_secs must be greater than zero")]
    ZeroTimeout,

    #[error("reaper.interval_secs must be greater than zero when the reaper is enabled")]
    ZeroReaperInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_not_found_includes_id() {
        let id = TransactionId::new();
        let err = CoordinatorError::TransactionNotFound(id);

        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn commit_refused_counts_failed_operations() {
        let err = CoordinatorError::CommitRefused {
            transaction_id: TransactionId::new(),
            failed_operations: vec![OperationId::new(), OperationId::new()],
        };

        assert!(err.to_string().contains("2 operation(s) failed"));
    }

    #[test]
    fn invalid_state_names_both_states() {
        let err = CoordinatorError::InvalidOperationState {
            operation_id: OperationId::new(),
            state: OperationState::Failed,
            requested: OperationState::Completed,
        };

        let msg = err.to_string();
        assert!(msg.contains("already failed"));
        assert!(msg.contains("mark it completed"));
    }

    #[test]
    fn into_work_returns_caller_error_only() {
        let work: ScopeError<std::io::Error> =
            ScopeError::Work(std::io::Error::other("disk full"));
        let coordinator: ScopeError<std::io::Error> =
            ScopeError::Coordinator(CoordinatorError::TransactionNotFound(TransactionId::new()));

        assert_eq!(
            work.into_work().map(|e| e.to_string()),
            Some("disk full".to_string())
        );
        assert!(coordinator.into_work().is_none());
    }
}
