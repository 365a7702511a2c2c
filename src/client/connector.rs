//! Broker client connection
//!
//! A single TCP connection carries every call. Requests are tagged with an
//! id; a background task reads responses and hands each one to the caller
//! waiting on that id, so a long poll and sends can be in flight together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::broker::{BrokerError, Message};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{decode_json, Call, FrameCodec, FrameReader, Outcome, Reply, Request, Response};

use super::config::ClientConfig;

type Pending = Arc<StdMutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// Client for a broker server
///
/// Methods take `&self`; share the client through an `Arc` to poll from one
/// task while sending from another.
///
/// # Example
/// ```no_run
/// use chat_broker::client::{BrokerClient, ClientConfig};
///
/// # async fn example() -> chat_broker::error::Result<()> {
/// let client = BrokerClient::connect(ClientConfig::new("127.0.0.1:12346")).await?;
/// client.join("alice").await?;
/// client.send("alice", "hello").await?;
///
/// for message in client.poll("alice", 1000, 10).await? {
///     println!("{}", message);
/// }
/// # Ok(())
/// # }
/// ```
pub struct BrokerClient {
    config: ClientConfig,
    request_codec: FrameCodec,
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl BrokerClient {
    /// Connect to a broker server
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        tracing::debug!(addr = %config.addr, "Connecting to broker");

        let socket = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&config.addr))
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))??;

        if config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }

        // Requests are held to the server's default line limit; responses
        // to the configured one.
        let response_codec = FrameCodec::new(config.max_frame_size);
        let (read_half, write_half) = socket.into_split();
        let pending: Pending = Arc::new(StdMutex::new(HashMap::new()));
        let reader = tokio::spawn(read_responses(read_half, response_codec, Arc::clone(&pending)));

        tracing::info!(addr = %config.addr, "Connected to broker");

        Ok(Self {
            config,
            request_codec: FrameCodec::default(),
            writer: Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    /// Register `identity`
    pub async fn join(&self, identity: &str) -> Result<bool> {
        let call = Call::Join {
            identity: identity.to_string(),
        };
        match self.call(call, self.config.request_margin).await? {
            Reply::Joined { ok } => Ok(ok),
            other => Err(unexpected(other)),
        }
    }

    /// Unregister `identity`; `false` if it was not registered
    pub async fn leave(&self, identity: &str) -> Result<bool> {
        let call = Call::Leave {
            identity: identity.to_string(),
        };
        match self.call(call, self.config.request_margin).await? {
            Reply::Left { found } => Ok(found),
            other => Err(unexpected(other)),
        }
    }

    /// Broadcast `text` from `identity` to every other participant
    pub async fn send(&self, identity: &str, text: &str) -> Result<bool> {
        let call = Call::Send {
            identity: identity.to_string(),
            text: text.to_string(),
        };
        match self.call(call, self.config.request_margin).await? {
            Reply::Sent { ok } => Ok(ok),
            other => Err(unexpected(other)),
        }
    }

    /// Long-poll the mailbox of `identity`
    ///
    /// Non-positive `timeout_ms` or `max_batch` select the server defaults;
    /// the local deadline then follows [`ClientConfig::server_poll_timeout`].
    /// An empty result means the poll timed out.
    pub async fn poll(&self, identity: &str, timeout_ms: i64, max_batch: i64) -> Result<Vec<Message>> {
        let wait = if timeout_ms > 0 {
            Duration::from_millis(timeout_ms as u64)
        } else {
            self.config.server_poll_timeout
        };

        let call = Call::Poll {
            identity: identity.to_string(),
            timeout_ms,
            max_batch,
        };
        match self.call(call, wait + self.config.request_margin).await? {
            Reply::Messages { messages } => Ok(messages),
            other => Err(unexpected(other)),
        }
    }

    /// Number of requests awaiting a response
    pub fn in_flight(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Close the connection
    ///
    /// Identities joined over it are left by the server.
    pub async fn close(self) -> Result<()> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }

    async fn call(&self, call: Call, deadline: Duration) -> Result<Reply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let identity = call.identity().to_string();
        let name = call.name();

        let mut buf = BytesMut::with_capacity(256);
        self.request_codec.encode(&Request { id, call }, &mut buf)?;

        let (tx, rx) = oneshot::channel();
        self.register(id, tx)?;

        let written = {
            let mut writer = self.writer.lock().await;
            writer.write_all(&buf).await
        };
        if let Err(e) = written {
            self.forget(id);
            return Err(e.into());
        }

        tracing::trace!(request_id = id, call = name, "Request sent");

        let response = match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(Error::ConnectionClosed),
            Err(_) => {
                self.forget(id);
                return Err(Error::Timeout(deadline));
            }
        };

        match response.outcome {
            Outcome::Ok { reply } => Ok(reply),
            Outcome::Error { code, message } => Err(remote_error(code, message, &identity)),
        }
    }

    fn register(&self, id: u64, tx: oneshot::Sender<Response>) -> Result<()> {
        if self.reader.is_finished() {
            return Err(Error::ConnectionClosed);
        }
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.insert(id, tx);
                Ok(())
            }
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&id);
        }
    }
}

impl Drop for BrokerClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Route responses to their waiting callers until the connection ends
async fn read_responses(read_half: OwnedReadHalf, codec: FrameCodec, pending: Pending) {
    let mut reader = FrameReader::new(read_half, codec);

    loop {
        let frame = match reader.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Broker connection failed");
                break;
            }
        };

        let response = match decode_json::<Response>(&frame) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable response");
                continue;
            }
        };

        let waiter = pending.lock().ok().and_then(|mut p| p.remove(&response.id));
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => {
                let err = ProtocolError::UnexpectedResponse(response.id);
                tracing::warn!(error = %err, outcome = ?response.outcome, "Dropping response");
            }
        }
    }

    // Wake every waiter with a closed channel
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
    tracing::debug!("Broker connection closed");
}

fn remote_error(code: String, message: String, identity: &str) -> Error {
    match BrokerError::from_code(&code, identity) {
        Some(err) => Error::Broker(err),
        None => Error::Protocol(ProtocolError::Remote { code, message }),
    }
}

fn unexpected(reply: Reply) -> Error {
    Error::Protocol(ProtocolError::UnexpectedReply(format!("{:?}", reply)))
}
