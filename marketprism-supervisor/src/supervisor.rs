//! One supervisor task owns a set of long-lived tasks (per-exchange WS
//! task, REST pollers, order-book loops, publisher/consumer workers),
//! restarting each with back-off on a retryable failure and exiting the
//! whole process on a fatal one. Grounded on `marketprism-data`'s
//! `run_connector` outer reconnect loop, generalized from "one connector"
//! to "any async closure returning `Result<(), TaskError>`".

use crate::task::{backoff_delay, TaskError};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Graceful-shutdown drain window: stop accepting new subscriptions,
/// drain publisher queues, commit outstanding acks, per `spec.md` §5.
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

pub struct Supervisor {
    name: &'static str,
}

impl Supervisor {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Run `task` until it returns `Ok(())` (clean exit, no restart),
    /// `Err(TaskError::Fatal)` (logs and returns the exit code to the
    /// caller, which is expected to terminate the process), or the
    /// `shutdown` future resolves (cooperative cancellation point).
    pub async fn run_task<F, Fut>(
        &self,
        task_name: &str,
        mut task: F,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), i32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), TaskError>>,
    {
        let mut attempt = 0u32;
        loop {
            if *shutdown.borrow() {
                info!(supervisor = self.name, task_name, "shutdown requested before task start");
                return Ok(());
            }

            let outcome = tokio::select! {
                result = task() => result,
                _ = shutdown.changed() => {
                    info!(supervisor = self.name, task_name, "shutdown requested, stopping task");
                    return Ok(());
                }
            };

            match outcome {
                Ok(()) => {
                    info!(supervisor = self.name, task_name, "task exited cleanly");
                    return Ok(());
                }
                Err(TaskError::Fatal { message, exit_code }) => {
                    error!(supervisor = self.name, task_name, message, exit_code, "fatal task error, process must exit");
                    return Err(exit_code);
                }
                Err(TaskError::Retryable(reason)) => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        supervisor = self.name,
                        task_name,
                        attempt,
                        reason,
                        delay_ms = delay.as_millis() as u64,
                        "task failed, restarting after back-off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_a_retryable_task_until_it_succeeds() {
        let supervisor = Supervisor::new("test");
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = supervisor
            .run_task(
                "flaky",
                move || {
                    let attempts = attempts_clone.clone();
                    async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                            Err(TaskError::Retryable("not yet".into()))
                        } else {
                            Ok(())
                        }
                    }
                },
                shutdown_rx,
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_returns_its_exit_code_without_retrying() {
        let supervisor = Supervisor::new("test");
        let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let result = supervisor
            .run_task(
                "doomed",
                || async { Err(TaskError::fatal("impossible state", 1)) },
                shutdown_rx,
            )
            .await;

        assert_eq!(result, Err(1));
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop_without_an_error() {
        let supervisor = Supervisor::new("test");
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(true);
        drop(shutdown_tx);

        let result = supervisor
            .run_task("anything", || async { unreachable!("should not run after shutdown") }, shutdown_rx)
            .await;

        assert!(result.is_ok());
    }
}
