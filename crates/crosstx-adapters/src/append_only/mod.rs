mod reader;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::SecondsFormat;
use crosstx_core::{Clock, InsertRecord, OperationId, Row, StoreResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

pub use reader::{
    apply_corrections, apply_tombstones, apply_tombstones_written_at, primary_key_of,
};

use crate::traits::AppendOnlyStore;

pub const DELETED_AT: &str = "deleted_at";
pub const CORRECTED_AT: &str = "corrected_at";
pub const RESTORED_AT: &str = "restored_at";
pub const OPERATION_ID: &str = "operation_id";
pub const REASON: &str = "reason";
pub const ROLLBACK_REASON: &str = "rollback_compensation";

/// Names of the companion streams that carry compensation records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamNaming {
    pub deletions_suffix: String,
    pub corrections_suffix: String,
}

impl Default for StreamNaming {
    fn default() -> Self {
        Self {
            deletions_suffix: "_deletions".to_string(),
            corrections_suffix: "_corrections".to_string(),
        }
    }
}

impl StreamNaming {
    #[must_use]
    pub fn deletions_stream(&self, stream: &str) -> String {
        format!("{stream}{}", self.deletions_suffix)
    }

    #[must_use]
    pub fn corrections_stream(&self, stream: &str) -> String {
        format!("{stream}{}", self.corrections_suffix)
    }
}

/// Result of replaying the tombstones buffered under one operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertCompensationSummary {
    pub total: usize,
    pub failed: usize,
    /// Inserts whose tombstone could not be written.
    pub unwritten: Vec<InsertRecord>,
}

impl InsertCompensationSummary {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.total - self.failed
    }
}

/// Write path to a store that cannot roll back.
///
/// Every write can later be undone logically: inserts by a tombstone in the
/// deletions stream, updates by a correction in the corrections stream, and
/// deletes by re-inserting the original row. Each compensation row carries
/// the originating operation id.
pub struct AppendOnlyStoreAdapter<A: AppendOnlyStore> {
    store: A,
    naming: StreamNaming,
    clock: Arc<dyn Clock>,
    inserts: Mutex<HashMap<OperationId, Vec<InsertRecord>>>,
}

impl<A: AppendOnlyStore> AppendOnlyStoreAdapter<A> {
    #[must_use]
    pub fn new(store: A, naming: StreamNaming, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            naming,
            clock,
            inserts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &A {
        &self.store
    }

    #[must_use]
    pub fn naming(&self) -> &StreamNaming {
        &self.naming
    }

    pub async fn insert(&self, stream: &str, rows: Vec<Row>) -> StoreResult<()> {
        self.store.insert(stream, rows).await
    }

    /// Remember an insert made under `operation_id` for later tombstoning.
    pub fn record_insert(&self, operation_id: OperationId, stream: &str, primary_key: Row) {
        self.inserts
            .lock()
            .entry(operation_id)
            .or_default()
            .push(InsertRecord {
                stream: stream.to_string(),
                primary_key,
            });
    }

    /// Insert `rows` and record each row's primary key under `operation_id`.
    ///
    /// Keys are extracted before anything is written, so a row missing a key
    /// field rejects the whole batch.
    pub async fn insert_tracked(
        &self,
        operation_id: OperationId,
        stream: &str,
        rows: Vec<Row>,
        primary_key_fields: &[&str],
    ) -> StoreResult<()> {
        let keys = rows
            .iter()
            .map(|row| primary_key_of(row, primary_key_fields))
            .collect::<StoreResult<Vec<_>>>()?;

        self.store.insert(stream, rows).await?;

        let mut inserts = self.inserts.lock();
        let records = inserts.entry(operation_id).or_default();
        records.extend(keys.into_iter().map(|primary_key| InsertRecord {
            stream: stream.to_string(),
            primary_key,
        }));
        Ok(())
    }

    #[must_use]
    pub fn buffered_inserts(&self, operation_id: OperationId) -> Vec<InsertRecord> {
        self.inserts
            .lock()
            .get(&operation_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn buffered_operations(&self) -> usize {
        self.inserts.lock().len()
    }

    /// Put insert records back under `operation_id` so a later
    /// [`compensate_inserts`](Self::compensate_inserts) replays them.
    pub fn requeue_inserts(&self, operation_id: OperationId, records: Vec<InsertRecord>) {
        if records.is_empty() {
            return;
        }
        self.inserts
            .lock()
            .entry(operation_id)
            .or_default()
            .extend(records);
    }

    /// Drop the buffered insert records of `operation_id`.
    pub fn discard(&self, operation_id: OperationId) -> usize {
        self.inserts
            .lock()
            .remove(&operation_id)
            .map_or(0, |records| records.len())
    }

    fn timestamp(&self) -> Value {
        Value::String(
            self.clock
                .now()
                .to_rfc3339_opts(SecondsFormat::Micros, true),
        )
    }

    /// Write a tombstone for one inserted row.
    pub async fn compensate_insert(
        &self,
        operation_id: OperationId,
        stream: &str,
        primary_key: &Row,
    ) -> StoreResult<()> {
        let mut tombstone = primary_key.clone();
        tombstone.insert(DELETED_AT.to_string(), self.timestamp());
        tombstone.insert(REASON.to_string(), Value::from(ROLLBACK_REASON));
        tombstone.insert(OPERATION_ID.to_string(), Value::from(operation_id.to_string()));

        let target = self.naming.deletions_stream(stream);
        self.store.insert(&target, vec![tombstone]).await?;
        debug!(operation = %operation_id, stream = %target, "wrote tombstone");
        Ok(())
    }

    /// Write a correction restoring the pre-update values of one row.
    pub async fn compensate_update(
        &self,
        operation_id: OperationId,
        stream: &str,
        primary_key: &Row,
        original: &Row,
    ) -> StoreResult<()> {
        let mut correction = primary_key.clone();
        for (field, value) in original {
            correction.insert(field.clone(), value.clone());
        }
        correction.insert(CORRECTED_AT.to_string(), self.timestamp());
        correction.insert(OPERATION_ID.to_string(), Value::from(operation_id.to_string()));

        let target = self.naming.corrections_stream(stream);
        self.store.insert(&target, vec![correction]).await?;
        debug!(operation = %operation_id, stream = %target, "wrote correction");
        Ok(())
    }

    /// Re-insert a deleted row into its original stream.
    pub async fn compensate_delete(
        &self,
        operation_id: OperationId,
        stream: &str,
        original: &Row,
    ) -> StoreResult<()> {
        let mut restored = original.clone();
        restored.insert(RESTORED_AT.to_string(), self.timestamp());
        restored.insert(OPERATION_ID.to_string(), Value::from(operation_id.to_string()));

        self.store.insert(stream, vec![restored]).await?;
        debug!(operation = %operation_id, stream = %stream, "restored deleted row");
        Ok(())
    }

    /// Tombstone every insert buffered under `operation_id`, then drop the buffer.
    ///
    /// Individual failures are logged and counted, never raised, and the
    /// buffer is discarded either way. The records that failed come back in
    /// [`InsertCompensationSummary::unwritten`].
    pub async fn compensate_inserts(&self, operation_id: OperationId) -> InsertCompensationSummary {
        let records = self.inserts.lock().remove(&operation_id).unwrap_or_default();
        let mut summary = InsertCompensationSummary {
            total: records.len(),
            ..InsertCompensationSummary::default()
        };

        for record in records {
            let written = self
                .compensate_insert(operation_id, &record.stream, &record.primary_key)
                .await;
            if let Err(err) = written {
                error!(
                    operation = %operation_id,
                    stream = %record.stream,
                    error = %err,
                    "failed to write tombstone"
                );
                summary.failed += 1;
                summary.unwritten.push(record);
            }
        }

        summary
    }
}
