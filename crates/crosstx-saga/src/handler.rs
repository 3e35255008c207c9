use async_trait::async_trait;
use crosstx_core::Operation;

use crate::error::CompensationError;

/// Logically reverses a completed operation of one kind.
///
/// Handlers are looked up by [`crosstx_core::OperationKind`] when a
/// transaction rolls back. They receive the operation as it was completed,
/// including its compensation data, and issue whatever writes are needed to
/// undo its effect.
#[async_trait]
pub trait CompensationHandler: Send + Sync {
    /// Human-readable name for logging and audit records.
    fn name(&self) -> &'static str;

    /// Undo the operation's effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the compensating action could not be carried out.
    /// The operation then stays completed and needs manual reconciliation.
    async fn compensate(&self, operation: &Operation) -> Result<(), CompensationError>;

    /// Human-readable description of what compensation will do.
    fn compensation_description(&self) -> String {
        format!("undo {}", self.name())
    }
}
