//! Fan-out worker
//!
//! The broadcaster is the only consumer of the intake bus. For each message
//! it snapshots the live recipients (everyone but the sender) and offers the
//! message to each mailbox with `try_send` semantics. A full mailbox loses
//! that message; nobody else waits for it.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::dispatcher::Intake;
use super::mailbox::Delivery;
use super::message::Message;
use super::store::Registry;
use crate::stats::BrokerStats;

/// Result of fanning out one message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Mailboxes that accepted the message
    pub delivered: usize,
    /// Mailboxes that were full or closed
    pub dropped: usize,
}

/// Single worker moving messages from the intake bus into mailboxes
pub struct Broadcaster {
    registry: Arc<Registry>,
    stats: Arc<BrokerStats>,
}

impl Broadcaster {
    /// Create a broadcaster over `registry`
    pub fn new(registry: Arc<Registry>, stats: Arc<BrokerStats>) -> Self {
        Self { registry, stats }
    }

    /// Spawn the worker on the current runtime
    ///
    /// The task ends once every [`Dispatcher`](super::Dispatcher) is dropped
    /// and the bus is drained.
    pub fn spawn(self, intake: Intake) -> JoinHandle<()> {
        tokio::spawn(self.run(intake))
    }

    /// Drain the intake bus until it closes
    pub async fn run(self, mut intake: Intake) {
        tracing::debug!("Broadcaster started");

        while let Some(message) = intake.recv().await {
            self.fan_out(&message).await;
        }

        tracing::debug!("Broadcaster stopped");
    }

    /// Offer one message to every live participant except its sender
    pub async fn fan_out(&self, message: &Message) -> FanOut {
        let recipients = self.registry.recipients(&message.from).await;
        let mut outcome = FanOut::default();

        for recipient in &recipients {
            match recipient.deliver(message.clone()) {
                Delivery::Delivered => outcome.delivered += 1,
                Delivery::Full => {
                    outcome.dropped += 1;
                    tracing::warn!(
                        participant = %recipient.id,
                        capacity = recipient.mailbox.capacity(),
                        "Mailbox full, dropping message"
                    );
                }
                Delivery::Closed => {
                    // Left between the snapshot and the delivery
                    outcome.dropped += 1;
                    tracing::debug!(participant = %recipient.id, "Mailbox closed, dropping message");
                }
            }
        }

        self.stats
            .record_fan_out(outcome.delivered as u64, outcome.dropped as u64);

        if message.system {
            tracing::info!(recipients = recipients.len(), "{}", message.text);
        } else {
            tracing::info!(
                recipients = recipients.len(),
                "[{}] {}: {}",
                message.time.format("%H:%M:%S"),
                message.from,
                message.text
            );
        }

        outcome
    }
}
