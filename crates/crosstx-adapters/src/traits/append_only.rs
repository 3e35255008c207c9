use async_trait::async_trait;
use crosstx_core::{Row, StoreResult};

#[async_trait]
pub trait AppendOnlyStore: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns an error if the store rejects the batch.
    async fn insert(&self, stream: &str, rows: Vec<Row>) -> StoreResult<()>;
}
