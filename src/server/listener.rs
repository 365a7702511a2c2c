//! Broker server listener
//!
//! Accepts TCP connections, admits them against the optional connection
//! limit and hands each one to its own [`Connection`] task. The broker's idle
//! reaper runs for as long as the listener does.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use crate::broker::{Broker, BrokerConfig};
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// Broker server
pub struct BrokerServer {
    config: ServerConfig,
    broker: Arc<Broker>,
    next_session_id: AtomicU64,
    connection_limit: Option<Arc<Semaphore>>,
}

impl BrokerServer {
    /// Create a new server with the given configuration
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_broker_config(config, BrokerConfig::default())
    }

    /// Create a new server with custom broker configuration
    pub fn with_broker_config(config: ServerConfig, broker_config: BrokerConfig) -> Self {
        Self::with_broker(config, Arc::new(Broker::with_config(broker_config)))
    }

    /// Create a new server around an existing broker
    pub fn with_broker(config: ServerConfig, broker: Arc<Broker>) -> Self {
        let connection_limit =
            (config.max_connections > 0).then(|| Arc::new(Semaphore::new(config.max_connections)));

        Self {
            config,
            broker,
            next_session_id: AtomicU64::new(1),
            connection_limit,
        }
    }

    /// Get a reference to the broker
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Run the server until the process exits
    ///
    /// Returns early only if the listener cannot be bound.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Broker server listening");

        // Spawn idle participant reaper
        let reaper_handle = self.broker.spawn_reaper();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        // Stop reaper on shutdown
        if let Some(handle) = reaper_handle {
            handle.abort();
        }

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Take a connection slot; `Err` if the limit is reached
    fn admit(&self) -> std::result::Result<Option<OwnedSemaphorePermit>, TryAcquireError> {
        match &self.connection_limit {
            Some(limit) => Arc::clone(limit).try_acquire_owned().map(Some),
            None => Ok(None),
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let Ok(permit) = self.admit() else {
            tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
            return;
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session_id = session_id,
            peer = %peer_addr,
            "New connection"
        );

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        let config = self.config.clone();
        let broker = Arc::clone(&self.broker);

        tokio::spawn(async move {
            // Held for the lifetime of the connection
            let _permit = permit;
            let connection = Connection::new(session_id, socket, peer_addr, config, broker);

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    session_id = session_id,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
