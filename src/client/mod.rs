//! Broker client implementation
//!
//! Provides client-side access to a broker server for:
//! - Joining and leaving under an identity
//! - Sending chat lines and long-polling for messages over one connection

pub mod config;
pub mod connector;

pub use config::ClientConfig;
pub use connector::BrokerClient;
