//! Tracks a heartbeat per long-lived task so `/health` can answer
//! liveness without each task knowing anything about HTTP.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// `spec.md` §4.7: liveness requires every owned task's last heartbeat to
/// be within this window.
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, serde::Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub alive: bool,
    #[serde(skip)]
    pub since_last_beat: Duration,
}

#[derive(Default)]
pub struct HealthRegistry {
    heartbeats: RwLock<HashMap<String, Instant>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task so it appears in `/health` output even before its
    /// first heartbeat (avoids a startup race where `/health` reports
    /// healthy simply because nothing has registered yet).
    pub fn register(&self, task: impl Into<String>) {
        self.heartbeats.write().entry(task.into()).or_insert_with(Instant::now);
    }

    pub fn heartbeat(&self, task: impl Into<String>) {
        self.heartbeats.write().insert(task.into(), Instant::now());
    }

    /// `true` iff every registered task has beaten within [`LIVENESS_WINDOW`].
    pub fn is_alive(&self) -> bool {
        let now = Instant::now();
        self.heartbeats
            .read()
            .values()
            .all(|beat| now.duration_since(*beat) <= LIVENESS_WINDOW)
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        let now = Instant::now();
        self.heartbeats
            .read()
            .iter()
            .map(|(name, beat)| {
                let since = now.duration_since(*beat);
                TaskStatus {
                    name: name.clone(),
                    alive: since <= LIVENESS_WINDOW,
                    since_last_beat: since,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_alive_with_no_tasks() {
        let registry = HealthRegistry::new();
        assert!(registry.is_alive());
    }

    #[test]
    fn a_fresh_heartbeat_counts_as_alive() {
        let registry = HealthRegistry::new();
        registry.heartbeat("ws-binance");
        assert!(registry.is_alive());
        let statuses = registry.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].alive);
    }

    #[test]
    fn registering_without_a_heartbeat_still_counts_as_alive_initially() {
        let registry = HealthRegistry::new();
        registry.register("cold-replicator");
        assert!(registry.is_alive());
    }
}
