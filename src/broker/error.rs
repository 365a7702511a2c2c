//! Broker error types
//!
//! Per-call failures of the broker core. Each has a stable wire code.

use thiserror::Error;

/// Failure of a single broker call
///
/// None of these variants leave the registry in a modified state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Identity was empty
    #[error("empty id")]
    InvalidIdentity,

    /// Identity is already owned by a live participant
    #[error("id already in use: {0}")]
    AlreadyRegistered(String),

    /// Identity has not joined (or has already left)
    #[error("not joined: {0}")]
    NotRegistered(String),

    /// Message text was empty
    #[error("empty message")]
    EmptyText,

    /// Participant's mailbox was closed while polling
    #[error("client disconnected: {0}")]
    Disconnected(String),

    /// Broker intake is closed
    #[error("broker is shutting down")]
    ShuttingDown,
}

impl BrokerError {
    /// Stable wire code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentity => "INVALID_IDENTITY",
            Self::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            Self::NotRegistered(_) => "NOT_REGISTERED",
            Self::EmptyText => "EMPTY_TEXT",
            Self::Disconnected(_) => "DISCONNECTED",
            Self::ShuttingDown => "SHUTTING_DOWN",
        }
    }

    /// Rebuild an error from its wire code
    ///
    /// `identity` fills the variants that carry one. Unknown codes yield `None`.
    pub fn from_code(code: &str, identity: &str) -> Option<Self> {
        let err = match code {
            "INVALID_IDENTITY" => Self::InvalidIdentity,
            "ALREADY_REGISTERED" => Self::AlreadyRegistered(identity.to_string()),
            "NOT_REGISTERED" => Self::NotRegistered(identity.to_string()),
            "EMPTY_TEXT" => Self::EmptyText,
            "DISCONNECTED" => Self::Disconnected(identity.to_string()),
            "SHUTTING_DOWN" => Self::ShuttingDown,
            _ => return None,
        };
        Some(err)
    }

    /// Whether the caller's session is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected(_) | Self::ShuttingDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        let errors = [
            BrokerError::InvalidIdentity,
            BrokerError::AlreadyRegistered("alice".into()),
            BrokerError::NotRegistered("alice".into()),
            BrokerError::EmptyText,
            BrokerError::Disconnected("alice".into()),
            BrokerError::ShuttingDown,
        ];

        for err in errors {
            assert_eq!(BrokerError::from_code(err.code(), "alice"), Some(err));
        }
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(BrokerError::from_code("BAD_REQUEST", "alice"), None);
    }

    #[test]
    fn test_terminal() {
        assert!(BrokerError::Disconnected("a".into()).is_terminal());
        assert!(BrokerError::ShuttingDown.is_terminal());
        assert!(!BrokerError::NotRegistered("a".into()).is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BrokerError::AlreadyRegistered("bob".into()).to_string(),
            "id already in use: bob"
        );
    }
}
