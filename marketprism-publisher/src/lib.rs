pub mod fallback;
pub mod publisher;
pub mod streams;
pub mod subject;

pub use fallback::FallbackQueue;
pub use publisher::{PublishError, PublishOutcome, Publisher, FALLBACK_DRAIN_INTERVAL};
pub use subject::subject_for;
