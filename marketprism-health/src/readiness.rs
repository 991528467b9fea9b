//! `/ready` asks whether this process's dependencies (NATS, ClickHouse)
//! are currently reachable — distinct from liveness, which only asks
//! whether this process's own tasks are still making progress.

use async_trait::async_trait;

#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    /// Name shown in the `/ready` JSON body, e.g. `"nats"` or `"clickhouse"`.
    fn name(&self) -> &str;
    async fn check(&self) -> bool;
}

pub struct AlwaysReady;

#[async_trait]
impl ReadinessCheck for AlwaysReady {
    fn name(&self) -> &str {
        "always"
    }

    async fn check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_ready_is_always_ready() {
        assert!(AlwaysReady.check().await);
    }
}
