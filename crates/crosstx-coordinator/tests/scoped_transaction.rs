//! The `transaction` helper commits on success and rolls back on error.

use std::fmt;

use crosstx_adapters::memory::{InMemoryAppendOnlyStore, InMemoryRelationalBackend};
use crosstx_core::{Metadata, OperationKind, Row, TransactionId};
use crosstx_coordinator::{CoordinatorError, ScopeError, TransactionCoordinator};
use serde_json::json;

type Coordinator = TransactionCoordinator<InMemoryRelationalBackend, InMemoryAppendOnlyStore>;

fn coordinator() -> Coordinator {
    TransactionCoordinator::new(InMemoryRelationalBackend::new(), InMemoryAppendOnlyStore::new())
}

fn order(id: i64) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), json!(id));
    row
}

#[derive(Debug)]
enum CheckoutError {
    OutOfStock,
    Coordinator(CoordinatorError),
}

impl fmt::Display for CheckoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfStock => write!(f, "out of stock"),
            Self::Coordinator(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for CheckoutError {}

impl From<CoordinatorError> for CheckoutError {
    fn from(err: CoordinatorError) -> Self {
        Self::Coordinator(err)
    }
}

async fn place_order(
    coordinator: &Coordinator,
    tx: TransactionId,
    id: i64,
) -> Result<(), CheckoutError> {
    let op = coordinator
        .add_operation(tx, OperationKind::RelationalWrite, Metadata::new())
        .await?;
    if let Some(session) = coordinator.relational_session(tx) {
        session.lock().await.insert("orders", order(id));
    }
    coordinator.complete_operation(tx, op)?;
    Ok(())
}

#[tokio::test]
async fn successful_work_is_committed() -> anyhow::Result<()> {
    let coordinator = &coordinator();

    let value = coordinator
        .transaction(Metadata::new(), |tx| async move {
            place_order(coordinator, tx, 1).await?;
            Ok::<_, CheckoutError>(42)
        })
        .await?;

    assert_eq!(value, 42);
    assert_eq!(coordinator.relational().backend().rows("orders").len(), 1);
    assert!(coordinator.active_transactions().is_empty());
    Ok(())
}

#[tokio::test]
async fn failing_work_is_rolled_back_and_its_error_returned() -> anyhow::Result<()> {
    let coordinator = &coordinator();

    let result = coordinator
        .transaction(Metadata::new(), |tx| async move {
            place_order(coordinator, tx, 1).await?;
            Err::<(), _>(CheckoutError::OutOfStock)
        })
        .await;

    let err = result.err().ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert!(matches!(err.into_work(), Some(CheckoutError::OutOfStock)));
    assert!(coordinator.relational().backend().rows("orders").is_empty());
    assert!(coordinator.active_transactions().is_empty());
    Ok(())
}

#[tokio::test]
async fn commit_failure_surfaces_as_coordinator_error() {
    let coordinator = &coordinator();
    coordinator.relational().backend().set_fail_commit(true);

    let result = coordinator
        .transaction(Metadata::new(), |tx| async move {
            place_order(coordinator, tx, 1).await?;
            Ok::<_, CheckoutError>(())
        })
        .await;

    assert!(matches!(
        result,
        Err(ScopeError::Coordinator(CoordinatorError::CommitFailed { .. }))
    ));
    assert!(coordinator.relational().backend().rows("orders").is_empty());
    assert!(coordinator.active_transactions().is_empty());
}

#[tokio::test]
async fn failed_operation_refuses_commit_and_rolls_back() {
    let coordinator = &coordinator();

    let result = coordinator
        .transaction(Metadata::new(), |tx| async move {
            let op = coordinator
                .add_operation(tx, OperationKind::AppendOnlyInsert, Metadata::new())
                .await?;
            coordinator.fail_operation(tx, op, "stream unavailable")?;
            Ok::<_, CheckoutError>(())
        })
        .await;

    assert!(matches!(
        result,
        Err(ScopeError::Coordinator(CoordinatorError::CommitRefused { .. }))
    ));
    assert!(coordinator.active_transactions().is_empty());
}

#[tokio::test]
async fn rollback_failure_replaces_the_work_error() {
    let coordinator = &coordinator();
    coordinator.relational().backend().set_fail_rollback(true);

    let result = coordinator
        .transaction(Metadata::new(), |tx| async move {
            place_order(coordinator, tx, 1).await?;
            Err::<(), _>(CheckoutError::OutOfStock)
        })
        .await;

    assert!(matches!(
        result,
        Err(ScopeError::Coordinator(CoordinatorError::RollbackFailed { .. }))
    ));
}
