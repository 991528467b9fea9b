//! A long-lived task's outcome: either a retryable hiccup the supervisor
//! restarts after a back-off, or a fatal invariant violation that should
//! bring the whole process down with a specific exit code so an external
//! process manager restarts it instead.

use thiserror::Error;
use std::time::Duration;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Retryable(String),
    #[error("{message}")]
    Fatal { message: String, exit_code: i32 },
}

impl TaskError {
    pub fn fatal(message: impl Into<String>, exit_code: i32) -> Self {
        Self::Fatal {
            message: message.into(),
            exit_code,
        }
    }
}

pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Exponential back-off with full jitter, same shape as
/// `marketprism-data`'s connector reconnect loop: `attempt` doubles the
/// base up to the cap, then a uniform random delay in `[0, cap]` is drawn.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(BACKOFF_CAP);
    Duration::from_secs_f64(rand::random::<f64>() * capped.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_never_exceeds_the_cap() {
        for attempt in 0..20 {
            assert!(backoff_delay(attempt) <= BACKOFF_CAP);
        }
    }

    #[test]
    fn fatal_error_carries_its_exit_code() {
        let err = TaskError::fatal("impossible ordering in own queue", 1);
        match err {
            TaskError::Fatal { exit_code, .. } => assert_eq!(exit_code, 1),
            _ => panic!("expected a fatal error"),
        }
    }
}
