//! Compensation infrastructure for cross-store sagas.
//!
//! Stores without native rollback are undone by compensating writes. This
//! crate maps each operation kind to the handler that knows how to write
//! that compensation, and records what happened to every operation while a
//! transaction is rolled back.

mod audit;
mod error;
mod handler;
mod registry;

pub use audit::{CompensationAuditLog, CompensationRecord, CompensationStatus};
pub use error::CompensationError;
pub use handler::CompensationHandler;
pub use registry::CompensationRegistry;
