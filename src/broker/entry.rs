//! Participant entry
//!
//! This module defines the per-participant state stored in the registry.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::mailbox::{Delivery, Mailbox};
use super::message::{Message, ParticipantId};

/// Entry for a single live participant
#[derive(Debug)]
pub struct Participant {
    /// Identity owning this entry
    pub id: ParticipantId,

    /// Undelivered messages
    pub(super) mailbox: Mailbox,

    /// Set once by leave or the reaper
    closed: AtomicBool,

    /// Number of polls currently waiting on the mailbox
    active_polls: AtomicU32,

    /// Last join, send or poll by this participant
    last_seen: Mutex<Instant>,

    /// When the participant joined
    pub joined_at: Instant,
}

impl Participant {
    /// Create a new participant with an empty mailbox
    pub(super) fn new(id: ParticipantId, mailbox_capacity: usize) -> Self {
        let now = Instant::now();

        Self {
            id,
            mailbox: Mailbox::new(mailbox_capacity),
            closed: AtomicBool::new(false),
            active_polls: AtomicU32::new(0),
            last_seen: Mutex::new(now),
            joined_at: now,
        }
    }

    /// Whether the participant has been removed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed and close the mailbox
    ///
    /// Returns `false` if already closed.
    pub(super) fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.mailbox.close();
        true
    }

    /// Offer a message to this participant without waiting
    pub(super) fn deliver(&self, message: Message) -> Delivery {
        if self.is_closed() {
            return Delivery::Closed;
        }
        self.mailbox.try_push(message)
    }

    /// Number of messages waiting in the mailbox
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Record activity
    pub(super) fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .map(|last_seen| last_seen.elapsed())
            .unwrap_or_default()
    }

    /// Whether a poll is currently waiting on the mailbox
    pub fn is_polling(&self) -> bool {
        self.active_polls.load(Ordering::Acquire) > 0
    }

    /// Mark a poll in flight until the guard drops
    pub(super) fn begin_poll(&self) -> PollGuard<'_> {
        self.active_polls.fetch_add(1, Ordering::AcqRel);
        self.touch();
        PollGuard { participant: self }
    }
}

/// Keeps a participant marked as polling
///
/// Dropping the guard, including when the poll future is cancelled,
/// records activity and clears the mark.
pub(super) struct PollGuard<'a> {
    participant: &'a Participant,
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.participant.touch();
        self.participant.active_polls.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time view of a participant
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    /// Identity
    pub id: ParticipantId,
    /// Messages waiting in the mailbox
    pub pending: usize,
    /// Time since the last activity
    pub idle_for: Duration,
    /// Whether a poll is waiting
    pub polling: bool,
}

impl From<&Participant> for ParticipantInfo {
    fn from(participant: &Participant) -> Self {
        Self {
            id: participant.id.clone(),
            pending: participant.pending(),
            idle_for: participant.idle_for(),
            polling: participant.is_polling(),
        }
    }
}
