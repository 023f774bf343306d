//! Queue operations that give up as soon as the run is cancelled
//!
//! A plain `send` on a full channel or `recv` on an empty one would keep a
//! stage parked after cancellation if its peer has stopped. Every queue
//! operation in the pipeline goes through these helpers instead, which race
//! the operation against the cancellation token.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Outcome of a cancellable send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The item was queued
    Sent,
    /// The run was cancelled first
    Cancelled,
    /// Every receiver is gone
    Disconnected,
}

/// Outcome of a cancellable receive
#[derive(Debug, PartialEq, Eq)]
pub enum Received<T> {
    Item(T),
    /// All senders are gone and the queue is drained
    Closed,
    Cancelled,
}

/// Send `item`, or stop waiting once `cancel` fires
pub async fn send<T>(tx: &mpsc::Sender<T>, item: T, cancel: &CancellationToken) -> Delivery {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Delivery::Cancelled,
        result = tx.send(item) => match result {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Disconnected,
        },
    }
}

/// Receiving half shared by several consumers
///
/// Each item goes to exactly one consumer.
pub struct SharedReceiver<T> {
    inner: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedReceiver<T> {
    pub fn new(rx: mpsc::Receiver<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rx)),
        }
    }

    /// Receive the next item, or stop waiting once `cancel` fires
    pub async fn recv(&self, cancel: &CancellationToken) -> Received<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Received::Cancelled,
            item = async { self.inner.lock().await.recv().await } => match item {
                Some(item) => Received::Item(item),
                None => Received::Closed,
            },
        }
    }
}
