pub mod clock;
pub mod error;
mod operation;
mod transaction;
pub mod types;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
pub use error::*;
pub use operation::{CompensationData, InsertRecord, Operation};
pub use transaction::{DEFAULT_TIMEOUT, Transaction};
pub use types::*;
