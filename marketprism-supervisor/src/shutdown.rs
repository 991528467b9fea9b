//! SIGTERM/Ctrl+C handling. Spawns a task that flips a `watch` cell to
//! `true` the moment a termination signal arrives; every supervised task
//! watches the same cell as its cooperative-cancellation point.

use tokio::sync::watch;

pub fn listen_for_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received, notifying supervised tasks");
        let _ = tx.send(true);
    });

    rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_receiver_starts_false() {
        let rx = listen_for_shutdown();
        assert!(!*rx.borrow());
    }
}
