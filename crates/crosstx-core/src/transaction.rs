use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::Operation;
use crate::types::{Metadata, OperationId, OperationState, TransactionId, TransactionState};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A cross-store transaction and the operations attached to it.
///
/// Operations are kept in append order, which is also the order in which
/// their effects happened; rollback walks them back to front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub state: TransactionState,
    pub operations: Vec<Operation>,
    pub created_at: DateTime<Utc>,
    pub timeout: Duration,
    pub metadata: Metadata,
}

impl Transaction {
    #[must_use]
    pub fn new(metadata: Metadata, created_at: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Pending,
            operations: Vec::new(),
            created_at,
            timeout,
            metadata,
        }
    }

    /// Whether more than `timeout` has elapsed between creation and `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match (now - self.created_at).to_std() {
            Ok(elapsed) => elapsed > self.timeout,
            // `now` is before creation
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn operation(&self, id: OperationId) -> Option<&Operation> {
        self.operations.iter().find(|op| op.id == id)
    }

    pub fn operation_mut(&mut self, id: OperationId) -> Option<&mut Operation> {
        self.operations.iter_mut().find(|op| op.id == id)
    }

    #[must_use]
    pub fn failed_operations(&self) -> Vec<OperationId> {
        self.operations_in(OperationState::Failed)
    }

    #[must_use]
    pub fn has_failed_operations(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.state == OperationState::Failed)
    }

    #[must_use]
    pub fn operations_in(&self, state: OperationState) -> Vec<OperationId> {
        self.operations
            .iter()
            .filter(|op| op.state == state)
            .map(|op| op.id)
            .collect()
    }

    #[must_use]
    pub fn has_relational_operations(&self) -> bool {
        self.operations.iter().any(|op| op.kind.is_relational())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationKind;

    fn transaction_at(created_at: DateTime<Utc>) -> Transaction {
        Transaction::new(Metadata::new(), created_at, DEFAULT_TIMEOUT)
    }

    #[test]
    fn new_transaction_starts_pending_and_empty() {
        let tx = transaction_at(Utc::now());

        assert_eq!(tx.state, TransactionState::Pending);
        assert!(tx.operations.is_empty());
        assert_eq!(tx.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn not_expired_within_timeout() {
        let created = Utc::now();
        let tx = transaction_at(created);

        assert!(!tx.is_expired_at(created + chrono::TimeDelta::minutes(5)));
    }

    #[test]
    fn expired_after_timeout() {
        let created = Utc::now();
        let tx = transaction_at(created);
        let later = created + chrono::TimeDelta::minutes(5) + chrono::TimeDelta::seconds(1);

        assert!(tx.is_expired_at(later));
    }

    #[test]
    fn clock_skew_before_creation_is_not_expired() {
        let created = Utc::now();
        let tx = transaction_at(created);

        assert!(!tx.is_expired_at(created - chrono::TimeDelta::hours(1)));
    }

    #[test]
    fn failed_operations_lists_only_failed() {
        let now = Utc::now();
        let mut tx = transaction_at(now);
        let mut ok = Operation::new(OperationKind::RelationalWrite, Metadata::new(), now);
        ok.mark_completed(now);
        let mut bad = Operation::new(OperationKind::AppendOnlyInsert, Metadata::new(), now);
        bad.mark_failed("boom", now);
        let bad_id = bad.id;
        tx.operations.push(ok);
        tx.operations.push(bad);

        assert!(tx.has_failed_operations());
        assert_eq!(tx.failed_operations(), vec![bad_id]);
        assert!(tx.has_relational_operations());
    }

    #[test]
    fn operation_lookup_by_id() {
        let now = Utc::now();
        let mut tx = transaction_at(now);
        let op = Operation::new(OperationKind::AppendOnlyDelete, Metadata::new(), now);
        let id = op.id;
        tx.operations.push(op);

        assert!(tx.operation(id).is_some());
        assert!(tx.operation(OperationId::new()).is_none());
        if let Some(op) = tx.operation_mut(id) {
            op.mark_completed(now);
        }
        assert_eq!(tx.operations_in(OperationState::Completed), vec![id]);
    }
}
