//! Long-poll broadcast chat broker
//!
//! Participants join under a unique identity, send text lines that are
//! broadcast to every other participant, and long-poll a bounded mailbox
//! for messages addressed to them.
//!
//! The crate has three layers:
//! - [`broker`]: the in-process broker (registry, broadcast bus, mailboxes)
//! - [`server`] / [`protocol`]: a TCP server speaking line-delimited JSON
//! - [`client`]: a client for that server
//!
//! # Example
//! ```no_run
//! use chat_broker::{Broker, BrokerConfig};
//!
//! # async fn example() -> chat_broker::Result<()> {
//! let broker = Broker::with_config(BrokerConfig::default());
//! broker.join("alice").await?;
//! broker.join("bob").await?;
//! broker.send("alice", "hi bob").await?;
//!
//! for message in broker.poll("bob", 1000, 10).await? {
//!     println!("{}", message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod stats;

pub use broker::{Broker, BrokerConfig, Message, ParticipantId};
pub use client::{BrokerClient, ClientConfig};
pub use error::{Error, Result};
pub use server::{BrokerServer, ServerConfig};
