pub mod readiness;
pub mod registry;
pub mod router;

pub use readiness::{AlwaysReady, ReadinessCheck};
pub use registry::{HealthRegistry, TaskStatus, LIVENESS_WINDOW};
pub use router::build_router;

pub use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
