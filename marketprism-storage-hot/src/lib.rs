pub mod batch;
pub mod consumer;
pub mod error;
pub mod schema;
pub mod spool;
pub mod store;

pub use batch::{batch_policy_for, resolve_batch_policy, BatchPolicy};
pub use error::{SchemaMismatch, StoreError};
pub use spool::Spool;
pub use store::{ClickHouseStore, HotStore, InMemoryHotStore};
