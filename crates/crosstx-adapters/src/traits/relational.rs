use async_trait::async_trait;
use crosstx_core::StoreResult;

/// One native session of a transactional relational store.
///
/// Dropping a session closes it. Writes are issued through
/// backend-specific methods on the concrete session type.
#[async_trait]
pub trait RelationalSession: Send + 'static {
    /// # Errors
    ///
    /// Returns an error if the native transaction cannot be started.
    async fn begin(&mut self) -> StoreResult<()>;

    /// # Errors
    ///
    /// Returns an error if the native commit fails; the session must then
    /// still accept a rollback.
    async fn commit(&mut self) -> StoreResult<()>;

    /// # Errors
    ///
    /// Returns an error if the native rollback fails.
    async fn rollback(&mut self) -> StoreResult<()>;
}

#[async_trait]
pub trait RelationalBackend: Send + Sync + 'static {
    type Session: RelationalSession;

    /// # Errors
    ///
    /// Returns an error if no connection can be obtained.
    async fn open_session(&self) -> StoreResult<Self::Session>;
}
