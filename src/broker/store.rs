//! Participant registry implementation
//!
//! The registry owns every live participant and its mailbox. It never calls
//! out to other components; announcing joins and departures is left to the
//! [`Broker`](super::Broker).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::entry::{Participant, ParticipantInfo};
use super::error::BrokerError;
use super::message::ParticipantId;

/// Registry of live participants
///
/// Thread-safe via `RwLock`: joins and leaves take the write lock, lookups and
/// recipient snapshots share the read lock. No lock is held while a caller
/// waits on a mailbox.
#[derive(Debug)]
pub struct Registry {
    /// Map of identity to participant entry
    participants: RwLock<HashMap<ParticipantId, Arc<Participant>>>,

    /// Capacity given to every new mailbox
    mailbox_capacity: usize,
}

impl Registry {
    /// Create an empty registry
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            participants: RwLock::new(HashMap::new()),
            mailbox_capacity,
        }
    }

    /// Register a new participant
    ///
    /// Returns an error if the identity is already live.
    pub async fn join(&self, id: &ParticipantId) -> Result<Arc<Participant>, BrokerError> {
        let mut participants = self.participants.write().await;

        if participants.contains_key(id) {
            return Err(BrokerError::AlreadyRegistered(id.to_string()));
        }

        let participant = Arc::new(Participant::new(id.clone(), self.mailbox_capacity));
        participants.insert(id.clone(), Arc::clone(&participant));

        tracing::info!(
            participant = %id,
            participants = participants.len(),
            "Participant joined"
        );

        Ok(participant)
    }

    /// Remove a participant and close its mailbox
    ///
    /// Returns the removed entry, or `None` if the identity was not live.
    pub async fn leave(&self, id: &str) -> Option<Arc<Participant>> {
        let mut participants = self.participants.write().await;

        let participant = participants.remove(id)?;
        participant.close();

        tracing::info!(
            participant = %participant.id,
            participants = participants.len(),
            "Participant left"
        );

        Some(participant)
    }

    /// Remove `participant` only if it is still the live entry for its identity
    ///
    /// Returns `false` if the identity was left, reaped or re-joined by
    /// someone else in the meantime.
    pub async fn leave_if(&self, participant: &Arc<Participant>) -> bool {
        let mut participants = self.participants.write().await;

        match participants.get(participant.id.as_str()) {
            Some(current) if Arc::ptr_eq(current, participant) => {}
            _ => return false,
        }

        participants.remove(participant.id.as_str());
        participant.close();

        tracing::info!(
            participant = %participant.id,
            participants = participants.len(),
            "Participant left"
        );

        true
    }

    /// Look up a live participant
    pub async fn lookup(&self, id: &str) -> Option<Arc<Participant>> {
        let participants = self.participants.read().await;
        participants
            .get(id)
            .filter(|participant| !participant.is_closed())
            .cloned()
    }

    /// Snapshot every live participant except `exclude`
    pub async fn recipients(&self, exclude: &ParticipantId) -> Vec<Arc<Participant>> {
        let participants = self.participants.read().await;
        participants
            .iter()
            .filter(|(id, participant)| *id != exclude && !participant.is_closed())
            .map(|(_, participant)| Arc::clone(participant))
            .collect()
    }

    /// Remove participants idle for longer than `idle_timeout`
    ///
    /// Participants with a poll in flight are never removed. Returns the
    /// removed entries, already closed.
    pub async fn reap_idle(&self, idle_timeout: Duration) -> Vec<Arc<Participant>> {
        let mut participants = self.participants.write().await;

        let idle: Vec<ParticipantId> = participants
            .values()
            .filter(|p| !p.is_polling() && p.idle_for() > idle_timeout)
            .map(|p| p.id.clone())
            .collect();

        let mut reaped = Vec::with_capacity(idle.len());
        for id in idle {
            if let Some(participant) = participants.remove(&id) {
                participant.close();
                tracing::info!(
                    participant = %id,
                    idle_secs = participant.idle_for().as_secs(),
                    "Participant reaped"
                );
                reaped.push(participant);
            }
        }

        reaped
    }

    /// Remove and close every participant
    pub async fn close_all(&self) -> Vec<Arc<Participant>> {
        let mut participants = self.participants.write().await;
        let closed: Vec<Arc<Participant>> = participants.drain().map(|(_, p)| p).collect();

        for participant in &closed {
            participant.close();
        }

        closed
    }

    /// Number of live participants
    pub async fn len(&self) -> usize {
        self.participants.read().await.len()
    }

    /// Whether no participants are live
    pub async fn is_empty(&self) -> bool {
        self.participants.read().await.is_empty()
    }

    /// Point-in-time view of every live participant, ordered by identity
    pub async fn participants(&self) -> Vec<ParticipantInfo> {
        let participants = self.participants.read().await;
        let mut infos: Vec<ParticipantInfo> = participants
            .values()
            .map(|p| ParticipantInfo::from(p.as_ref()))
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_join_unique() {
        let registry = Registry::new(4);

        registry.join(&id("alice")).await.unwrap();
        let result = registry.join(&id("alice")).await;

        assert_eq!(
            result.unwrap_err(),
            BrokerError::AlreadyRegistered("alice".into())
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_leave_closes_entry() {
        let registry = Registry::new(4);
        let alice = registry.join(&id("alice")).await.unwrap();

        let removed = registry.leave("alice").await.unwrap();

        assert!(Arc::ptr_eq(&alice, &removed));
        assert!(alice.is_closed());
        assert!(registry.lookup("alice").await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_leave_missing() {
        let registry = Registry::new(4);
        assert!(registry.leave("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_rejoin_after_leave() {
        let registry = Registry::new(4);
        let first = registry.join(&id("alice")).await.unwrap();
        registry.leave("alice").await;

        let second = registry.join(&id("alice")).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn test_leave_if_ignores_replaced_entry() {
        let registry = Registry::new(4);
        let first = registry.join(&id("alice")).await.unwrap();
        registry.leave("alice").await;
        let second = registry.join(&id("alice")).await.unwrap();

        assert!(!registry.leave_if(&first).await);
        assert!(!second.is_closed());
        assert!(registry.lookup("alice").await.is_some());

        assert!(registry.leave_if(&second).await);
        assert!(second.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_recipients_exclude_sender() {
        let registry = Registry::new(4);
        for name in ["alice", "bob", "carol"] {
            registry.join(&id(name)).await.unwrap();
        }

        let mut names: Vec<_> = registry
            .recipients(&id("alice"))
            .await
            .iter()
            .map(|p| p.id.to_string())
            .collect();
        names.sort();

        assert_eq!(names, ["bob", "carol"]);
    }

    #[tokio::test]
    async fn test_reap_skips_active_pollers() {
        let registry = Registry::new(4);
        registry.join(&id("idle")).await.unwrap();
        let poller = registry.join(&id("poller")).await.unwrap();
        let _guard = poller.begin_poll();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let reaped = registry.reap_idle(Duration::from_millis(10)).await;

        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].id.as_str(), "idle");
        assert!(reaped[0].is_closed());
        assert!(registry.lookup("poller").await.is_some());
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = Registry::new(4);
        let alice = registry.join(&id("alice")).await.unwrap();
        registry.join(&id("bob")).await.unwrap();

        let closed = registry.close_all().await;

        assert_eq!(closed.len(), 2);
        assert!(alice.is_closed());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_participants_sorted() {
        let registry = Registry::new(4);
        registry.join(&id("bob")).await.unwrap();
        registry.join(&id("alice")).await.unwrap();

        let infos = registry.participants().await;
        let names: Vec<_> = infos.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(names, ["alice", "bob"]);
    }
}
