//! Bounded, typed channel helpers. Every stage of the pipeline (connector ->
//! normalizer -> publisher) hands its output across one of these instead of
//! an unbounded channel, so a slow downstream stage applies backpressure
//! instead of letting memory grow without bound.

use std::fmt;
use tokio::sync::mpsc;

/// Error returned when the receiving half of a [`Tx`] has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError;

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel receiver dropped")
    }
}

impl std::error::Error for SendError {}

/// Narrow sending interface so producers can be generic over "a bounded
/// channel sender of `T`" without naming `tokio::sync::mpsc::Sender`
/// directly.
pub trait Tx<T>: Clone + Send + Sync + 'static {
    fn send(&self, item: T) -> Result<(), SendError>;
}

#[derive(Debug)]
pub struct BoundedTx<T>(mpsc::Sender<T>);

impl<T> Clone for BoundedTx<T> {
    fn clone(&self) -> Self {
        BoundedTx(self.0.clone())
    }
}

impl<T: Send + 'static> Tx<T> for BoundedTx<T> {
    fn send(&self, item: T) -> Result<(), SendError> {
        self.0.try_send(item).map_err(|_| SendError)
    }
}

/// Construct a bounded channel with the given capacity, returning the
/// [`Tx`]-implementing sender and the raw `Receiver`.
pub fn bounded<T>(capacity: usize) -> (BoundedTx<T>, mpsc::Receiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (BoundedTx(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let (tx, mut rx) = bounded::<u32>(4);
        tx.send(7).unwrap();
        assert_eq!(rx.recv().await, Some(7));
    }

    #[tokio::test]
    async fn send_fails_once_receiver_is_dropped() {
        let (tx, rx) = bounded::<u32>(1);
        drop(rx);
        assert_eq!(tx.send(1), Err(SendError));
    }

    #[tokio::test]
    async fn send_fails_when_channel_is_full_instead_of_blocking() {
        let (tx, _rx) = bounded::<u32>(1);
        tx.send(1).unwrap();
        assert_eq!(tx.send(2), Err(SendError));
    }
}
