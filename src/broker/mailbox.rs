//! Per-participant bounded mailbox
//!
//! A mailbox is a bounded FIFO written by the broadcaster and drained by
//! long-poll readers. Writes never wait: a full mailbox rejects the message.
//! Closing is a separate `watch` signal so that a reader parked inside
//! [`Mailbox::recv_batch`] wakes up immediately, even though the mailbox
//! itself still owns the channel sender.

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{timeout_at, Instant};

use super::message::Message;

/// Outcome of a non-blocking delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Message queued
    Delivered,
    /// Mailbox at capacity, message dropped
    Full,
    /// Mailbox closed, message dropped
    Closed,
}

/// Bounded FIFO of messages for one participant
#[derive(Debug)]
pub struct Mailbox {
    tx: mpsc::Sender<Message>,
    /// Held by at most one reader at a time
    rx: Mutex<mpsc::Receiver<Message>>,
    closed: watch::Sender<bool>,
    capacity: usize,
}

impl Mailbox {
    /// Create an empty mailbox holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (closed, _) = watch::channel(false);

        Self {
            tx,
            rx: Mutex::new(rx),
            closed,
            capacity,
        }
    }

    /// Maximum number of queued messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages currently queued
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Whether no messages are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the mailbox has been closed
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Queue a message without waiting
    pub fn try_push(&self, message: Message) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }

        match self.tx.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Close the mailbox, waking every waiting reader
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Wait for messages until `deadline`, then drain without waiting
    ///
    /// Returns `None` once the mailbox is closed (also when the closure is
    /// noticed after the batch was drained), an empty batch on timeout, and
    /// otherwise between 1 and `max_batch` messages in arrival order.
    pub async fn recv_batch(&self, deadline: Instant, max_batch: usize) -> Option<Vec<Message>> {
        let mut closed = self.closed.subscribe();

        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => None,
            batch = self.wait_and_drain(deadline, max_batch.max(1)) => batch,
        }
    }

    async fn wait_and_drain(&self, deadline: Instant, max_batch: usize) -> Option<Vec<Message>> {
        // An earlier reader may still hold the receiver; that wait counts
        // against this reader's deadline.
        let Ok(mut rx) = timeout_at(deadline, self.rx.lock()).await else {
            return Some(Vec::new());
        };

        let first = match timeout_at(deadline, rx.recv()).await {
            Ok(Some(message)) => message,
            Ok(None) => return None,
            Err(_) => return Some(Vec::new()),
        };

        let mut batch = Vec::with_capacity(max_batch.min(self.capacity));
        batch.push(first);

        while batch.len() < max_batch {
            match rx.try_recv() {
                Ok(message) => batch.push(message),
                Err(_) => break,
            }
        }

        if self.is_closed() {
            return None;
        }

        Some(batch)
    }
}
