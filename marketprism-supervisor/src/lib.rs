pub mod shutdown;
pub mod supervisor;
pub mod task;

pub use shutdown::listen_for_shutdown;
pub use supervisor::{Supervisor, SHUTDOWN_DRAIN};
pub use task::{backoff_delay, TaskError, BACKOFF_BASE, BACKOFF_CAP};
