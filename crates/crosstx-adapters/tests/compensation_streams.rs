//! Built-in handlers dispatched through a registry, read back the way a downstream reader would.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use crosstx_adapters::append_only::{apply_corrections, apply_tombstones};
use crosstx_adapters::memory::InMemoryAppendOnlyStore;
use crosstx_adapters::{
    AppendOnlyStoreAdapter, CorrectionHandler, RestorationHandler, StreamNaming, TombstoneHandler,
};
use crosstx_core::{
    Clock, CompensationData, ManualClock, Metadata, Operation, OperationKind, Row, StoreError,
};
use crosstx_saga::{CompensationHandler, CompensationRegistry};
use serde_json::{Value, json};

type Adapter = AppendOnlyStoreAdapter<InMemoryAppendOnlyStore>;

fn obj(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

fn setup() -> anyhow::Result<(Arc<Adapter>, CompensationRegistry)> {
    let start = Utc
        .with_ymd_and_hms(2024, 6, 30, 23, 59, 59)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid start time"))?;
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(start));
    let naming = StreamNaming {
        deletions_suffix: ".tombstones".to_string(),
        corrections_suffix: ".fixes".to_string(),
    };
    let adapter = Arc::new(AppendOnlyStoreAdapter::new(
        InMemoryAppendOnlyStore::new(),
        naming,
        clock,
    ));

    let mut registry = CompensationRegistry::new();
    registry.register(
        OperationKind::AppendOnlyInsert,
        Arc::new(TombstoneHandler::new(Arc::clone(&adapter))),
    );
    registry.register(
        OperationKind::AppendOnlyUpdate,
        Arc::new(CorrectionHandler::new(Arc::clone(&adapter))),
    );
    registry.register(
        OperationKind::AppendOnlyDelete,
        Arc::new(RestorationHandler::new(Arc::clone(&adapter))),
    );
    Ok((adapter, registry))
}

async fn compensate(registry: &CompensationRegistry, operation: &Operation) -> anyhow::Result<()> {
    let handler = registry
        .get_handler(operation.kind)
        .ok_or_else(|| anyhow::anyhow!("no handler for {}", operation.kind))?;
    handler.compensate(operation).await?;
    Ok(())
}

#[tokio::test]
async fn tracked_batch_is_tombstoned_under_custom_suffix() -> anyhow::Result<()> {
    let (adapter, registry) = setup()?;
    let op = Operation::new(OperationKind::AppendOnlyInsert, Metadata::new(), Utc::now());
    let rows = vec![
        obj(json!({"tenant": "acme", "seq": 1, "amount": 10})),
        obj(json!({"tenant": "acme", "seq": 2, "amount": 20})),
    ];
    adapter
        .insert_tracked(op.id, "ledger", rows, &["tenant", "seq"])
        .await?;

    compensate(&registry, &op).await?;

    let store = adapter.store();
    let tombstones = store.rows("ledger.tombstones");
    assert_eq!(tombstones.len(), 2);
    assert_eq!(tombstones[1]["seq"], json!(2));
    assert_eq!(tombstones[0]["deleted_at"], json!("2024-06-30T23:59:59.000000Z"));
    assert!(apply_tombstones(&store.rows("ledger"), &tombstones, &["tenant", "seq"]).is_empty());
    assert!(adapter.buffered_inserts(op.id).is_empty());
    Ok(())
}

#[tokio::test]
async fn batch_missing_a_key_field_is_not_written() {
    let (adapter, _registry) = setup().expect("setup");
    let op = Operation::new(OperationKind::AppendOnlyInsert, Metadata::new(), Utc::now());
    let rows = vec![obj(json!({"seq": 1})), obj(json!({"amount": 5}))];

    let result = adapter.insert_tracked(op.id, "ledger", rows, &["seq"]).await;

    assert!(matches!(result, Err(StoreError::MissingPrimaryKey { .. })));
    assert!(adapter.store().rows("ledger").is_empty());
    assert_eq!(adapter.buffered_operations(), 0);
}

#[tokio::test]
async fn update_and_delete_are_reversed_in_place() -> anyhow::Result<()> {
    let (adapter, registry) = setup()?;
    adapter
        .insert("accounts", vec![obj(json!({"id": 9, "status": "closed"}))])
        .await?;
    let update = Operation::new(OperationKind::AppendOnlyUpdate, Metadata::new(), Utc::now())
        .with_compensation_data(CompensationData::Update {
            stream: "accounts".to_string(),
            primary_key: obj(json!({"id": 9})),
            original: obj(json!({"status": "open"})),
        });
    let delete = Operation::new(OperationKind::AppendOnlyDelete, Metadata::new(), Utc::now())
        .with_compensation_data(CompensationData::Delete {
            stream: "accounts".to_string(),
            original: obj(json!({"id": 4, "status": "open"})),
        });

    compensate(&registry, &delete).await?;
    compensate(&registry, &update).await?;

    let store = adapter.store();
    let corrections = store.rows("accounts.fixes");
    let visible = apply_corrections(&store.rows("accounts"), &corrections, &["id"]);
    assert_eq!(visible.len(), 2);
    assert_eq!(visible[0]["status"], json!("open"));
    assert_eq!(visible[1]["id"], json!(4));
    assert_eq!(visible[1]["operation_id"], json!(delete.id.to_string()));
    assert_eq!(store.stream_names(), vec!["accounts", "accounts.fixes"]);
    Ok(())
}
