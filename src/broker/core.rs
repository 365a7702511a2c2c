//! Broker facade
//!
//! Ties the registry, the intake bus, the broadcaster task and the reaper
//! together behind the four calls participants make: join, leave, send and
//! poll.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use super::broadcaster::Broadcaster;
use super::config::BrokerConfig;
use super::dispatcher::Dispatcher;
use super::entry::Participant;
use super::error::BrokerError;
use super::message::{Message, ParticipantId};
use super::poll::{long_poll, PollOptions};
use super::store::Registry;
use crate::stats::{BrokerStats, StatsSnapshot};

/// Broadcast broker
///
/// Must be created inside a Tokio runtime: construction spawns the
/// broadcaster task. Share it between connections behind an `Arc`.
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    stats: Arc<BrokerStats>,
    broadcaster: Mutex<Option<JoinHandle<()>>>,
}

impl Broker {
    /// Create a broker with default configuration
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with custom configuration
    pub fn with_config(config: BrokerConfig) -> Self {
        let registry = Arc::new(Registry::new(config.mailbox_capacity));
        let stats = Arc::new(BrokerStats::new());
        let (dispatcher, intake) = Dispatcher::channel(config.intake_capacity);

        let handle =
            Broadcaster::new(Arc::clone(&registry), Arc::clone(&stats)).spawn(intake);

        Self {
            config,
            registry,
            dispatcher,
            stats,
            broadcaster: Mutex::new(Some(handle)),
        }
    }

    /// Get the broker configuration
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Get a reference to the participant registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Current counter values
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Register `id` and announce the arrival to everyone else
    pub async fn join(&self, id: &str) -> Result<bool, BrokerError> {
        self.join_participant(id).await.map(|_| true)
    }

    /// Like [`join`](Self::join), returning the new registry entry
    ///
    /// The entry can later be passed to
    /// [`leave_participant`](Self::leave_participant) to leave exactly this
    /// registration and not a later one under the same identity.
    pub async fn join_participant(&self, id: &str) -> Result<Arc<Participant>, BrokerError> {
        let id = ParticipantId::new(id)?;

        if self.dispatcher.is_closed() {
            return Err(BrokerError::ShuttingDown);
        }

        let participant = self.registry.join(&id).await?;
        self.stats.record_join();
        self.announce(Message::joined(id)).await;

        Ok(participant)
    }

    /// Remove `id`, closing its mailbox
    ///
    /// Returns whether the identity was live. Leaving twice is not an error.
    pub async fn leave(&self, id: &str) -> Result<bool, BrokerError> {
        if id.is_empty() {
            return Err(BrokerError::InvalidIdentity);
        }

        let Some(participant) = self.registry.leave(id).await else {
            tracing::debug!(participant = id, "Leave for unknown participant");
            return Ok(false);
        };

        self.stats.record_leave();
        self.announce(Message::left(participant.id.clone())).await;

        Ok(true)
    }

    /// Leave `participant` if it is still the live registration for its identity
    ///
    /// Returns `false` without side effects if the identity already left or
    /// now belongs to a newer registration.
    pub async fn leave_participant(&self, participant: &Arc<Participant>) -> bool {
        if !self.registry.leave_if(participant).await {
            tracing::debug!(participant = %participant.id, "Registration already replaced");
            return false;
        }

        self.stats.record_leave();
        self.announce(Message::left(participant.id.clone())).await;

        true
    }

    /// Publish `text` from `id` to every other participant
    pub async fn send(&self, id: &str, text: &str) -> Result<bool, BrokerError> {
        if id.is_empty() {
            return Err(BrokerError::InvalidIdentity);
        }
        if text.is_empty() {
            return Err(BrokerError::EmptyText);
        }

        let participant = self
            .registry
            .lookup(id)
            .await
            .ok_or_else(|| BrokerError::NotRegistered(id.to_string()))?;
        participant.touch();

        self.publish(Message::user(participant.id.clone(), text))
            .await?;

        Ok(true)
    }

    /// Long-poll `id`'s mailbox
    ///
    /// Non-positive `timeout_ms` or `max_batch` fall back to the configured
    /// defaults. A timeout returns an empty list.
    pub async fn poll(
        &self,
        id: &str,
        timeout_ms: i64,
        max_batch: i64,
    ) -> Result<Vec<Message>, BrokerError> {
        self.poll_with(id, PollOptions::from_raw(timeout_ms, max_batch, &self.config))
            .await
    }

    /// Long-poll `id`'s mailbox with explicit options
    pub async fn poll_with(
        &self,
        id: &str,
        options: PollOptions,
    ) -> Result<Vec<Message>, BrokerError> {
        if id.is_empty() {
            return Err(BrokerError::InvalidIdentity);
        }

        let participant = self
            .registry
            .lookup(id)
            .await
            .ok_or_else(|| BrokerError::NotRegistered(id.to_string()))?;

        // Registry lock is released here; only the mailbox is awaited.
        long_poll(&participant, options).await
    }

    /// Remove participants idle past the configured timeout
    ///
    /// Returns the number removed. Does nothing if reaping is disabled.
    pub async fn reap_idle(&self) -> usize {
        let Some(idle_timeout) = self.config.idle_timeout else {
            return 0;
        };

        let reaped = self.registry.reap_idle(idle_timeout).await;
        self.stats.record_reaped(reaped.len() as u64);

        for participant in &reaped {
            self.announce(Message::left(participant.id.clone())).await;
        }

        reaped.len()
    }

    /// Spawn background reaper task
    ///
    /// Returns `None` if reaping is disabled, otherwise a handle that can be
    /// used to abort the task.
    pub fn spawn_reaper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        self.config.idle_timeout?;

        let broker = Arc::clone(self);
        let interval = broker.config.reap_interval;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                broker.reap_idle().await;
            }
        }))
    }

    /// Stop fan-out and disconnect every participant
    ///
    /// Pending polls return [`BrokerError::Disconnected`]; later calls fail
    /// with [`BrokerError::ShuttingDown`] or [`BrokerError::NotRegistered`].
    pub async fn shutdown(&self) {
        let handle = self
            .broadcaster
            .lock()
            .ok()
            .and_then(|mut broadcaster| broadcaster.take());

        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        let closed = self.registry.close_all().await;
        tracing::info!(participants = closed.len(), "Broker shut down");
    }

    async fn publish(&self, message: Message) -> Result<(), BrokerError> {
        self.dispatcher.publish(message).await?;
        self.stats.record_published();
        Ok(())
    }

    /// Publish a system notice; failure only means the broker is stopping
    async fn announce(&self, notice: Message) {
        if let Err(e) = self.publish(notice).await {
            tracing::debug!(error = %e, "System notice not published");
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if let Ok(mut broadcaster) = self.broadcaster.lock() {
            if let Some(handle) = broadcaster.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;

    fn broker() -> Broker {
        Broker::with_config(BrokerConfig::default().disable_reaper())
    }

    /// Poll until `count` messages have arrived or a second has passed
    async fn collect(broker: &Broker, id: &str, count: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(1);

        while messages.len() < count && Instant::now() < deadline {
            messages.extend(broker.poll(id, 100, 64).await.unwrap());
        }

        messages
    }

    /// Like `collect`, but ignores system notices
    async fn collect_chat(broker: &Broker, id: &str, count: usize) -> Vec<Message> {
        let mut messages = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(1);

        while messages.len() < count && Instant::now() < deadline {
            let batch = broker.poll(id, 100, 64).await.unwrap();
            messages.extend(batch.into_iter().filter(|m| !m.system));
        }

        messages
    }

    #[tokio::test]
    async fn test_validation() {
        let broker = broker();

        assert_eq!(broker.join("").await, Err(BrokerError::InvalidIdentity));
        assert_eq!(broker.leave("").await, Err(BrokerError::InvalidIdentity));
        assert_eq!(broker.send("", "hi").await, Err(BrokerError::InvalidIdentity));
        assert_eq!(broker.poll("", 10, 1).await, Err(BrokerError::InvalidIdentity));

        broker.join("alice").await.unwrap();
        assert_eq!(broker.send("alice", "").await, Err(BrokerError::EmptyText));
    }

    #[tokio::test]
    async fn test_not_registered() {
        let broker = broker();

        assert_eq!(
            broker.send("ghost", "hi").await,
            Err(BrokerError::NotRegistered("ghost".into()))
        );
        assert_eq!(
            broker.poll("ghost", 10, 1).await,
            Err(BrokerError::NotRegistered("ghost".into()))
        );
    }

    #[tokio::test]
    async fn test_join_twice() {
        let broker = broker();

        assert_eq!(broker.join("x").await, Ok(true));
        assert_eq!(
            broker.join("x").await,
            Err(BrokerError::AlreadyRegistered("x".into()))
        );
    }

    #[tokio::test]
    async fn test_leave_reports_found() {
        let broker = broker();
        broker.join("alice").await.unwrap();

        assert_eq!(broker.leave("alice").await, Ok(true));
        assert_eq!(broker.leave("alice").await, Ok(false));

        let stats = broker.stats();
        assert_eq!(stats.joins, 1);
        assert_eq!(stats.leaves, 1);
    }

    #[tokio::test]
    async fn test_system_notice_for_other_joiner() {
        let broker = broker();
        broker.join("a").await.unwrap();
        broker.join("b").await.unwrap();

        let messages = collect(&broker, "a", 1).await;

        assert_eq!(messages.len(), 1);
        assert!(messages[0].system);
        assert_eq!(messages[0].text, "User [b] joined");
        assert!(messages.iter().all(|m| m.from.as_str() != "a"));
    }

    #[tokio::test]
    async fn test_send_skips_sender() {
        let broker = broker();
        broker.join("a").await.unwrap();
        broker.join("b").await.unwrap();
        broker.send("a", "hi").await.unwrap();

        let to_b = collect_chat(&broker, "b", 1).await;
        assert_eq!(to_b.len(), 1);
        assert_eq!(to_b[0].text, "hi");
        assert_eq!(to_b[0].from.as_str(), "a");

        let to_a = broker.poll("a", 100, 64).await.unwrap();
        assert!(to_a.iter().all(|m| m.from.as_str() != "a"));
    }

    #[tokio::test]
    async fn test_fan_out_reaches_all_others() {
        let broker = broker();
        for id in ["a", "b", "c", "d"] {
            broker.join(id).await.unwrap();
        }
        broker.send("b", "round").await.unwrap();

        for id in ["a", "c", "d"] {
            let received = collect_chat(&broker, id, 1).await;
            assert_eq!(received.len(), 1, "recipient {}", id);
            assert_eq!(received[0].text, "round");
        }
        assert_eq!(broker.stats().published, 5);
    }

    #[tokio::test]
    async fn test_poll_timeout_is_empty() {
        let broker = broker();
        broker.join("a").await.unwrap();

        let started = Instant::now();
        let messages = broker.poll("a", 100, 10).await.unwrap();

        assert!(messages.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_leave_disconnects_pending_poll() {
        let broker = Arc::new(broker());
        broker.join("a").await.unwrap();

        let poll = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.poll("a", 5_000, 10).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        broker.leave("a").await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), poll)
            .await
            .expect("poll should return before its timeout")
            .unwrap();
        assert_eq!(result, Err(BrokerError::Disconnected("a".into())));
    }

    #[tokio::test]
    async fn test_leave_participant_spares_new_registration() {
        let broker = broker();
        let old = broker.join_participant("alice").await.unwrap();
        broker.leave("alice").await.unwrap();
        broker.join("alice").await.unwrap();

        assert!(!broker.leave_participant(&old).await);
        assert!(broker.registry().lookup("alice").await.is_some());
        assert_eq!(broker.stats().leaves, 1);

        let current = broker.registry().lookup("alice").await.unwrap();
        assert!(broker.leave_participant(&current).await);
        assert!(broker.registry().lookup("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_reap_idle() {
        let broker = Broker::with_config(
            BrokerConfig::default().idle_timeout(Duration::from_millis(20)),
        );
        broker.join("sleepy").await.unwrap();
        broker.join("watcher").await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        broker.send("watcher", "still here").await.unwrap();

        assert_eq!(broker.reap_idle().await, 1);
        assert!(broker.registry().lookup("sleepy").await.is_none());
        assert!(broker.registry().lookup("watcher").await.is_some());
        assert_eq!(broker.stats().reaped, 1);

        let notices = collect(&broker, "watcher", 2).await;
        assert!(notices.iter().any(|m| m.text == "User [sleepy] left"));
    }

    #[tokio::test]
    async fn test_reaper_disabled() {
        let broker = Arc::new(broker());
        assert!(broker.spawn_reaper().is_none());
        assert_eq!(broker.reap_idle().await, 0);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let broker = broker();
        broker.join("a").await.unwrap();

        broker.shutdown().await;

        assert_eq!(broker.join("b").await, Err(BrokerError::ShuttingDown));
        assert_eq!(
            broker.poll("a", 10, 1).await,
            Err(BrokerError::NotRegistered("a".into()))
        );
    }
}
