pub mod error;
pub mod replicator;
pub mod state;
pub mod window;

pub use error::ColdError;
pub use replicator::{backoff_delay, Replicator, ALL_TABLES};
pub use state::{ClickHouseReplicationState, InMemoryReplicationState, ReplicationState};
pub use window::next_window;
