use crosstx_core::{CompensationData, OperationId, OperationKind, StoreError};
use thiserror::Error;

/// Error from a failed or impossible compensation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompensationError {
    /// No handler is registered for the operation's kind.
    #[error("no compensation handler registered for {kind} (operation {operation_id})")]
    Unregistered {
        operation_id: OperationId,
        kind: OperationKind,
    },

    /// The operation carries nothing the handler could reverse.
    #[error("no compensation data recorded for {kind} operation {operation_id}")]
    MissingData {
        operation_id: OperationId,
        kind: OperationKind,
    },

    /// The compensating write was rejected by the store.
    #[error("compensating write for operation {operation_id} failed")]
    Write {
        operation_id: OperationId,
        #[source]
        source: StoreError,
    },

    /// Some of the buffered inserts could not be tombstoned.
    #[error("{failed} of {total} tombstone(s) for operation {operation_id} failed")]
    PartialTombstones {
        operation_id: OperationId,
        failed: usize,
        total: usize,
        /// The inserts whose tombstones were not written.
        remaining: CompensationData,
    },

    /// Failure raised by a caller-provided handler.
    #[error(transparent)]
    Handler(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl CompensationError {
    /// What is still owed after a partly applied compensation.
    ///
    /// Storing it on the operation lets a later attempt finish the job.
    #[must_use]
    pub fn remaining(&self) -> Option<&CompensationData> {
        match self {
            Self::PartialTombstones { remaining, .. } => Some(remaining),
            _ => None,
        }
    }
}
