//! Store adapters for the cross-store transaction coordinator.
//!
//! [`RelationalStoreAdapter`] pins one native session to each transaction so
//! relational work commits or rolls back atomically. [`AppendOnlyStoreAdapter`]
//! writes to a store that cannot roll back and knows how to undo each write
//! with a compensating record.

pub mod append_only;
pub mod handlers;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
mod relational;
pub mod traits;

pub use append_only::{AppendOnlyStoreAdapter, InsertCompensationSummary, StreamNaming};
pub use handlers::{CorrectionHandler, NativeRollbackHandler, RestorationHandler, TombstoneHandler};
pub use relational::{RelationalStoreAdapter, SharedSession};
pub use traits::{AppendOnlyStore, RelationalBackend, RelationalSession};
