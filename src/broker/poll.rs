//! Long-poll retrieval
//!
//! A poll parks the calling task on its participant's mailbox until a
//! message arrives, the mailbox closes or the timeout elapses. Once woken by
//! a message it takes whatever else is already queued, up to the batch
//! limit, and returns without waiting again.

use std::time::Duration;

use tokio::time::Instant;

use super::config::BrokerConfig;
use super::entry::Participant;
use super::error::BrokerError;
use super::message::Message;

/// Stand-in deadline for timeouts too large to represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365);

/// Effective poll parameters after defaults are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// How long to wait for the first message
    pub timeout: Duration,
    /// Maximum messages returned
    pub max_batch: usize,
}

impl PollOptions {
    /// Build options from raw call arguments
    ///
    /// Non-positive values are replaced by the configured defaults.
    pub fn from_raw(timeout_ms: i64, max_batch: i64, config: &BrokerConfig) -> Self {
        let timeout = if timeout_ms > 0 {
            Duration::from_millis(timeout_ms as u64)
        } else {
            config.default_poll_timeout
        };

        let max_batch = if max_batch > 0 {
            usize::try_from(max_batch).unwrap_or(usize::MAX)
        } else {
            config.default_max_batch
        };

        Self { timeout, max_batch }
    }

    /// Options with the configured defaults
    pub fn defaults(config: &BrokerConfig) -> Self {
        Self::from_raw(0, 0, config)
    }
}

/// Wait on `participant`'s mailbox according to `options`
///
/// A timeout yields an empty batch. A closed mailbox yields
/// [`BrokerError::Disconnected`].
pub(super) async fn long_poll(
    participant: &Participant,
    options: PollOptions,
) -> Result<Vec<Message>, BrokerError> {
    let _guard = participant.begin_poll();
    let now = Instant::now();
    let deadline = now
        .checked_add(options.timeout)
        .unwrap_or_else(|| now + FAR_FUTURE);

    let batch = participant
        .mailbox
        .recv_batch(deadline, options.max_batch)
        .await
        .ok_or_else(|| BrokerError::Disconnected(participant.id.to_string()))?;

    tracing::debug!(
        participant = %participant.id,
        messages = batch.len(),
        remaining = participant.pending(),
        "Poll completed"
    );

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_values_use_defaults() {
        let config = BrokerConfig::default();

        let options = PollOptions::from_raw(0, -5, &config);
        assert_eq!(options.timeout, Duration::from_millis(25_000));
        assert_eq!(options.max_batch, 32);

        assert_eq!(PollOptions::from_raw(-1, 0, &config), PollOptions::defaults(&config));
    }

    #[test]
    fn test_positive_values_kept() {
        let config = BrokerConfig::default();

        let options = PollOptions::from_raw(100, 10, &config);
        assert_eq!(options.timeout, Duration::from_millis(100));
        assert_eq!(options.max_batch, 10);
    }

    #[test]
    fn test_configured_defaults() {
        let config = BrokerConfig::default()
            .default_poll_timeout(Duration::from_secs(1))
            .default_max_batch(4);

        let options = PollOptions::defaults(&config);
        assert_eq!(options.timeout, Duration::from_secs(1));
        assert_eq!(options.max_batch, 4);
    }
}
