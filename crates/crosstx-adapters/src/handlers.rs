use std::sync::Arc;

use async_trait::async_trait;
use crosstx_core::{CompensationData, Operation};
use crosstx_saga::{CompensationError, CompensationHandler};

use crate::append_only::AppendOnlyStoreAdapter;
use crate::traits::AppendOnlyStore;

/// Relational operations are undone by rolling back the native session, so
/// there is nothing left to write for them individually.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeRollbackHandler;

#[async_trait]
impl CompensationHandler for NativeRollbackHandler {
    fn name(&self) -> &'static str {
        "native_rollback"
    }

    async fn compensate(&self, _operation: &Operation) -> Result<(), CompensationError> {
        Ok(())
    }

    fn compensation_description(&self) -> String {
        "undone by the native session rollback".to_string()
    }
}

/// Undoes append-only inserts by writing tombstones.
///
/// Replays the inserts buffered under the operation together with any
/// [`CompensationData::Inserts`] left over from an earlier attempt, and falls
/// back to [`CompensationData::Insert`] when there is neither. Inserts whose
/// tombstone could not be written come back in the error as
/// [`CompensationError::remaining`].
pub struct TombstoneHandler<A: AppendOnlyStore> {
    adapter: Arc<AppendOnlyStoreAdapter<A>>,
}

impl<A: AppendOnlyStore> TombstoneHandler<A> {
    #[must_use]
    pub fn new(adapter: Arc<AppendOnlyStoreAdapter<A>>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: AppendOnlyStore> CompensationHandler for TombstoneHandler<A> {
    fn name(&self) -> &'static str {
        "tombstone"
    }

    async fn compensate(&self, operation: &Operation) -> Result<(), CompensationError> {
        if let CompensationData::Inserts { records } = &operation.compensation_data {
            self.adapter.requeue_inserts(operation.id, records.clone());
        }
        let summary = self.adapter.compensate_inserts(operation.id).await;
        if summary.total > 0 {
            return if summary.failed == 0 {
                Ok(())
            } else {
                Err(CompensationError::PartialTombstones {
                    operation_id: operation.id,
                    failed: summary.failed,
                    total: summary.total,
                    remaining: CompensationData::Inserts {
                        records: summary.unwritten,
                    },
                })
            };
        }

        match &operation.compensation_data {
            CompensationData::Insert {
                stream,
                primary_key,
            } => self
                .adapter
                .compensate_insert(operation.id, stream, primary_key)
                .await
                .map_err(|source| CompensationError::Write {
                    operation_id: operation.id,
                    source,
                }),
            _ => Err(CompensationError::MissingData {
                operation_id: operation.id,
                kind: operation.kind,
            }),
        }
    }

    fn compensation_description(&self) -> String {
        "write tombstones for inserted rows".to_string()
    }
}

/// Undoes append-only updates by writing corrections with the pre-update values.
pub struct CorrectionHandler<A: AppendOnlyStore> {
    adapter: Arc<AppendOnlyStoreAdapter<A>>,
}

impl<A: AppendOnlyStore> CorrectionHandler<A> {
    #[must_use]
    pub fn new(adapter: Arc<AppendOnlyStoreAdapter<A>>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: AppendOnlyStore> CompensationHandler for CorrectionHandler<A> {
    fn name(&self) -> &'static str {
        "correction"
    }

    async fn compensate(&self, operation: &Operation) -> Result<(), CompensationError> {
        let CompensationData::Update {
            stream,
            primary_key,
            original,
        } = &operation.compensation_data
        else {
            return Err(CompensationError::MissingData {
                operation_id: operation.id,
                kind: operation.kind,
            });
        };

        self.adapter
            .compensate_update(operation.id, stream, primary_key, original)
            .await
            .map_err(|source| CompensationError::Write {
                operation_id: operation.id,
                source,
            })
    }

    fn compensation_description(&self) -> String {
        "write a correction restoring pre-update values".to_string()
    }
}

/// Undoes append-only deletes by re-inserting the original row.
pub struct RestorationHandler<A: AppendOnlyStore> {
    adapter: Arc<AppendOnlyStoreAdapter<A>>,
}

impl<A: AppendOnlyStore> RestorationHandler<A> {
    #[must_use]
    pub fn new(adapter: Arc<AppendOnlyStoreAdapter<A>>) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: AppendOnlyStore> CompensationHandler for RestorationHandler<A> {
    fn name(&self) -> &'static str {
        "restoration"
    }

    async fn compensate(&self, operation: &Operation) -> Result<(), CompensationError> {
        let CompensationData::Delete { stream, original } = &operation.compensation_data else {
            return Err(CompensationError::MissingData {
                operation_id: operation.id,
                kind: operation.kind,
            });
        };

        self.adapter
            .compensate_delete(operation.id, stream, original)
            .await
            .map_err(|source| CompensationError::Write {
                operation_id: operation.id,
                source,
            })
    }

    fn compensation_description(&self) -> String {
        "re-insert the deleted row".to_string()
    }
}
