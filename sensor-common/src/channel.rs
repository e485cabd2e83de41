use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Error returned by [`Producer::enqueue`] when the queue has been closed. Contains the item
/// that could not be enqueued.
#[derive(Error)]
#[error("dispatch queue closed")]
pub struct EnqueueError<T>(pub T);

impl<T> fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EnqueueError(..)")
    }
}

impl<T> EnqueueError<T> {
    /// Returns the rejected item.
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Creates a bounded, closable, multi-producer single-consumer queue with the given capacity.
/// Relies on Tokio's [`mpsc`] channel for storage and wakeups, and a [`CancellationToken`] for
/// closure so that any producer handle can close the queue for everyone.
///
/// A capacity of 0 is rounded up to 1.
pub fn dispatch_queue<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let closed = CancellationToken::new();

    (Producer { tx, closed: closed.clone() }, Consumer { rx, closed, shut: false })
}

/// The sending half of a dispatch queue. Cheap to clone, one per producer task.
pub struct Producer<T> {
    tx: mpsc::Sender<T>,
    closed: CancellationToken,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), closed: self.closed.clone() }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> Producer<T> {
    /// Enqueues an item, waiting until there is capacity.
    ///
    /// Fails only if the queue has been closed, either before the call or while waiting for
    /// capacity. In both cases the item is handed back in the error and nothing is enqueued.
    pub async fn enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        if self.closed.is_cancelled() {
            return Err(EnqueueError(item));
        }

        // Reserve first so the item is never moved into a send that might fail.
        let permit = tokio::select! {
            biased;

            _ = self.closed.cancelled() => None,
            permit = self.tx.reserve() => permit.ok(),
        };

        match permit {
            Some(permit) => {
                permit.send(item);
                Ok(())
            }
            None => Err(EnqueueError(item)),
        }
    }

    /// Closes the queue for all producers. Items already enqueued stay available to the
    /// consumer. Returns `true` if this call closed the queue, `false` if it was already closed.
    pub fn close(&self) -> bool {
        let was_closed = self.closed.is_cancelled();
        self.closed.cancel();

        if !was_closed {
            tracing::debug!(pending = self.len(), "Dispatch queue closed");
        }

        !was_closed
    }

    /// Returns `true` if the queue has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Returns the number of items currently buffered (including reserved slots).
    #[inline]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Returns `true` if no items are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the fixed capacity of the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// The receiving half of a dispatch queue.
#[derive(Debug)]
pub struct Consumer<T> {
    rx: mpsc::Receiver<T>,
    closed: CancellationToken,
    /// Whether closure has been propagated to the underlying receiver.
    shut: bool,
}

impl<T> Consumer<T> {
    /// Receives the next item in FIFO order.
    ///
    /// Returns `None` once the queue is closed (or all producers are gone) and every item
    /// enqueued before closure has been received.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if self.shut {
                return self.rx.recv().await;
            }

            tokio::select! {
                biased;

                item = self.rx.recv() => return item,
                _ = self.closed.cancelled() => {
                    // Rejects waiting producers, keeps the buffer for draining.
                    self.rx.close();
                    self.shut = true;
                }
            }
        }
    }

    /// Returns `true` if the queue has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
