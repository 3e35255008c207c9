mod append_only;
mod relational;

pub use append_only::AppendOnlyStore;
pub use relational::{RelationalBackend, RelationalSession};
