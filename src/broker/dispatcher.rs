//! Intake bus
//!
//! Every outbound message, user or system, enters the broker through the
//! [`Dispatcher`]. The bus is a bounded FIFO with many producers and a
//! single consumer, the [`Broadcaster`](super::Broadcaster).

use tokio::sync::mpsc;

use super::error::BrokerError;
use super::message::Message;

/// Producer side of the intake bus
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Message>,
}

/// Consumer side of the intake bus
pub type Intake = mpsc::Receiver<Message>;

impl Dispatcher {
    /// Create an intake bus holding at most `capacity` messages
    pub fn channel(capacity: usize) -> (Self, Intake) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue a message for fan-out
    ///
    /// Waits while the bus is full. Fails only once the consumer is gone.
    pub async fn publish(&self, message: Message) -> Result<(), BrokerError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| BrokerError::ShuttingDown)
    }

    /// Whether the consumer has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Free slots on the bus
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}
