//! Participant identities and broadcast messages
//!
//! This module defines the key type identifying participants and the
//! message that flows through the intake bus into every mailbox.

use std::borrow::Borrow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::BrokerError;

/// Identity of a participant
///
/// Never empty. Cheap to clone: the name is shared between the registry,
/// every queued message and any in-flight poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Arc<str>);

impl ParticipantId {
    /// Validate and wrap an identity
    pub fn new(id: impl AsRef<str>) -> Result<Self, BrokerError> {
        let id = id.as_ref();
        if id.is_empty() {
            return Err(BrokerError::InvalidIdentity);
        }
        Ok(Self(Arc::from(id)))
    }

    /// The identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ParticipantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for ParticipantId {
    type Error = BrokerError;

    fn try_from(id: &str) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

/// A message delivered to participants
///
/// Immutable once built. System notices carry the identity they are about
/// in `from`, so the subject of a join/leave notice never receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sender (or subject, for system notices)
    pub from: ParticipantId,
    /// Message body
    pub text: String,
    /// When the broker accepted the message
    pub time: DateTime<Utc>,
    /// Whether the broker generated this message
    pub system: bool,
}

impl Message {
    /// Create a user message stamped with the current time
    pub fn user(from: ParticipantId, text: impl Into<String>) -> Self {
        Self {
            from,
            text: text.into(),
            time: Utc::now(),
            system: false,
        }
    }

    /// Create a system notice about `subject`
    pub fn system(subject: ParticipantId, text: impl Into<String>) -> Self {
        Self {
            from: subject,
            text: text.into(),
            time: Utc::now(),
            system: true,
        }
    }

    /// Notice announcing that `id` joined
    pub fn joined(id: ParticipantId) -> Self {
        let text = format!("User [{}] joined", id);
        Self::system(id, text)
    }

    /// Notice announcing that `id` left
    pub fn left(id: ParticipantId) -> Self {
        let text = format!("User [{}] left", id);
        Self::system(id, text)
    }

    /// Whether this message must be withheld from `recipient`
    pub fn is_from(&self, recipient: &ParticipantId) -> bool {
        &self.from == recipient
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.system {
            f.write_str(&self.text)
        } else {
            write!(
                f,
                "[{}] {}: {}",
                self.time.format("%H:%M:%S"),
                self.from,
                self.text
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    #[test]
    fn test_empty_identity_rejected() {
        assert_eq!(ParticipantId::new(""), Err(BrokerError::InvalidIdentity));
        assert_eq!(
            ParticipantId::try_from(""),
            Err(BrokerError::InvalidIdentity)
        );
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(id("alice").to_string(), "alice");
        assert_eq!(id("alice").as_str(), "alice");
    }

    #[test]
    fn test_notices() {
        let joined = Message::joined(id("bob"));
        assert!(joined.system);
        assert_eq!(joined.text, "User [bob] joined");
        assert!(joined.is_from(&id("bob")));

        let left = Message::left(id("bob"));
        assert_eq!(left.text, "User [bob] left");
        assert!(!left.is_from(&id("alice")));
    }

    #[test]
    fn test_display_user_message() {
        let mut msg = Message::user(id("alice"), "hi");
        msg.time = Utc.with_ymd_and_hms(2024, 1, 2, 13, 4, 5).unwrap();

        assert_eq!(msg.to_string(), "[13:04:05] alice: hi");
        assert_eq!(Message::joined(id("bob")).to_string(), "User [bob] joined");
    }

    #[test]
    fn test_wire_shape() {
        let mut msg = Message::user(id("alice"), "hi");
        msg.time = Utc.with_ymd_and_hms(2024, 1, 2, 13, 4, 5).unwrap();

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["from"], "alice");
        assert_eq!(json["text"], "hi");
        assert_eq!(json["time"], "2024-01-02T13:04:05Z");
        assert_eq!(json["system"], false);
    }
}
