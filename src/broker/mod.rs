//! Broadcast broker core
//!
//! The broker accepts messages from any registered participant and delivers
//! them to every other live participant. Delivery is best-effort: a
//! participant that stops polling only loses its own messages once its
//! mailbox fills up.
//!
//! # Architecture
//!
//! ```text
//!   join / leave              send                     poll
//!        │                      │                        │
//!        ▼                      ▼                        │
//!   ┌──────────┐   notice  ┌────────────┐                │
//!   │ Registry │──────────►│ Dispatcher │ (bounded bus)  │
//!   │ RwLock<  │           └─────┬──────┘                │
//!   │  HashMap>│                 │ single consumer       │
//!   └────┬─────┘                 ▼                       │
//!        │  snapshot      ┌─────────────┐                │
//!        └───────────────►│ Broadcaster │                │
//!                         └──┬───────┬──┘                │
//!                 try_send   │       │  try_send         │
//!                            ▼       ▼                   ▼
//!                       [mailbox] [mailbox] ◄──── long_poll()
//!                       (bounded, drop on full)
//! ```
//!
//! # Backpressure
//!
//! The broadcaster never waits on a mailbox. A full mailbox drops the
//! message for that recipient only, so one slow participant cannot stall
//! delivery to anyone else.

pub mod broadcaster;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod poll;
pub mod store;

pub use broadcaster::{Broadcaster, FanOut};
pub use config::BrokerConfig;
pub use core::Broker;
pub use dispatcher::{Dispatcher, Intake};
pub use entry::{Participant, ParticipantInfo};
pub use error::BrokerError;
pub use mailbox::{Delivery, Mailbox};
pub use message::{Message, ParticipantId};
pub use poll::PollOptions;
pub use store::Registry;
