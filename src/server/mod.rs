//! Broker TCP server
//!
//! Exposes the broker's join, leave, send and poll calls over the
//! line-delimited JSON protocol in [`crate::protocol`].

pub mod config;
pub(crate) mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::BrokerServer;
