//! Session state
//!
//! Tracks one client connection from accept to close, including the
//! registrations made over it so they can be cleaned up when the
//! connection goes away. A registration is held by its registry entry, not
//! by name, so cleanup never touches a later join of the same identity from
//! another connection.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::broker::Participant;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Reading and serving requests
    Active,
    /// Connection ended, cleaning up
    Closing,
    /// Cleanup finished
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current phase
    pub phase: SessionPhase,

    /// Connection start time
    pub connected_at: Instant,

    /// Registrations made over this connection and not yet left
    participants: BTreeMap<String, Arc<Participant>>,

    /// Requests decoded so far
    pub requests: u64,

    /// Lines that failed to decode
    pub bad_requests: u64,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Active,
            connected_at: Instant::now(),
            participants: BTreeMap::new(),
            requests: 0,
            bad_requests: 0,
        }
    }

    /// Record a successful join over this connection
    pub fn on_join(&mut self, participant: Arc<Participant>) {
        self.participants
            .insert(participant.id.as_str().to_string(), participant);
    }

    /// Forget `identity` after a leave over this connection
    pub fn on_leave(&mut self, identity: &str) {
        self.participants.remove(identity);
    }

    /// Identities currently owned by this session
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.participants.keys().map(String::as_str)
    }

    /// Start closing; returns the registrations to clean up
    pub fn close(&mut self) -> Vec<Arc<Participant>> {
        self.phase = SessionPhase::Closing;
        std::mem::take(&mut self.participants).into_values().collect()
    }

    /// Mark cleanup finished
    pub fn finish(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Check if session is active
    pub fn is_active(&self) -> bool {
        self.phase == SessionPhase::Active
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::broker::{ParticipantId, Registry};

    fn state() -> SessionState {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 12346);
        SessionState::new(1, addr)
    }

    async fn participant(registry: &Registry, identity: &str) -> Arc<Participant> {
        registry
            .join(&ParticipantId::new(identity).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let registry = Registry::new(4);
        let mut state = state();
        assert!(state.is_active());

        state.on_join(participant(&registry, "bob").await);
        state.on_join(participant(&registry, "alice").await);
        assert_eq!(state.identities().collect::<Vec<_>>(), ["alice", "bob"]);

        let participants = state.close();
        let ids: Vec<&str> = participants.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["alice", "bob"]);
        assert_eq!(state.phase, SessionPhase::Closing);
        assert_eq!(state.identities().count(), 0);

        state.finish();
        assert_eq!(state.phase, SessionPhase::Closed);
    }

    #[tokio::test]
    async fn test_leave_forgets_identity() {
        let registry = Registry::new(4);
        let mut state = state();
        state.on_join(participant(&registry, "alice").await);

        state.on_leave("alice");
        state.on_leave("ghost");

        assert_eq!(state.identities().count(), 0);
        assert!(state.close().is_empty());
    }

    #[tokio::test]
    async fn test_rejoin_keeps_latest_registration() {
        let registry = Registry::new(4);
        let mut state = state();
        let first = participant(&registry, "alice").await;
        registry.leave("alice").await.unwrap();
        let second = participant(&registry, "alice").await;

        state.on_join(Arc::clone(&first));
        state.on_join(Arc::clone(&second));

        let participants = state.close();
        assert_eq!(participants.len(), 1);
        assert!(Arc::ptr_eq(&participants[0], &second));
    }
}
