//! Saga-style transactions across a relational store and an append-only store.
//!
//! A [`TransactionCoordinator`] groups operations on both stores into one
//! logical transaction. Relational writes run inside a single native session
//! and commit or roll back with it. Append-only writes are undone on rollback
//! by compensating records (tombstones, corrections and restorations)
//! written by the handler registered for each operation kind.
//!
//! ```ignore
//! let coordinator = TransactionCoordinator::new(backend, events);
//! let tx = coordinator.begin_transaction(Metadata::new());
//! let op = coordinator.add_operation(tx, OperationKind::AppendOnlyInsert, Metadata::new()).await?;
//! coordinator.append_only().insert_tracked(op, "events", rows, &["id"]).await?;
//! coordinator.complete_operation(tx, op)?;
//! coordinator.commit_transaction(tx).await?;
//! ```

mod config;
mod coordinator;
mod error;
mod reaper;
mod report;
mod scope;

pub use config::{CoordinatorConfig, ReaperConfig};
pub use coordinator::TransactionCoordinator;
pub use error::{ConfigError, CoordinatorError, Result, ScopeError};
pub use reaper::ExpirySweep;
pub use report::{CommitOutcome, RollbackReport};
