//! Client connection handler
//!
//! One task reads request lines, each request runs in its own task so a
//! long poll never holds up a send on the same connection, and a writer task
//! serializes responses back onto the socket in completion order.
//!
//! The configured frame limit applies to request lines only. Responses carry
//! drained mailbox batches that have already left the broker, so they are
//! written whatever their size.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::broker::{Broker, BrokerError};
use crate::error::Result;
use crate::protocol::{decode_json, Call, FrameCodec, FrameReader, Reply, Request, Response};
use crate::server::config::ServerConfig;
use crate::session::SessionState;

/// A single client connection
pub(crate) struct Connection {
    socket: TcpStream,
    config: ServerConfig,
    broker: Arc<Broker>,
    state: Arc<Mutex<SessionState>>,
}

impl Connection {
    pub(crate) fn new(
        session_id: u64,
        socket: TcpStream,
        peer_addr: SocketAddr,
        config: ServerConfig,
        broker: Arc<Broker>,
    ) -> Self {
        Self {
            socket,
            config,
            broker,
            state: Arc::new(Mutex::new(SessionState::new(session_id, peer_addr))),
        }
    }

    /// Serve requests until the peer disconnects
    pub(crate) async fn run(self) -> Result<()> {
        let Connection {
            socket,
            config,
            broker,
            state,
        } = self;

        let session_id = state.lock().map(|s| s.id).unwrap_or_default();
        let (read_half, write_half) = socket.into_split();
        let (tx, rx) = mpsc::channel::<Response>(config.response_queue.max(1));
        let (closing_tx, closing_rx) = watch::channel(false);

        let writer = tokio::spawn(write_responses(write_half, rx, FrameCodec::unbounded()));
        let mut reader = FrameReader::new(read_half, FrameCodec::new(config.max_frame_size));
        let mut requests = JoinSet::new();

        let result = loop {
            let frame = match reader.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            while requests.try_join_next().is_some() {}

            let request = match decode_json::<Request>(&frame) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!(session_id = session_id, error = %e, "Bad request");
                    if let Ok(mut state) = state.lock() {
                        state.bad_requests += 1;
                    }
                    if tx.send(Response::bad_request(e.to_string())).await.is_err() {
                        break Ok(());
                    }
                    continue;
                }
            };

            if let Ok(mut state) = state.lock() {
                state.requests += 1;
            }

            let broker = Arc::clone(&broker);
            let state = Arc::clone(&state);
            let tx = tx.clone();
            let closing = closing_rx.clone();
            requests.spawn(async move {
                let response = if matches!(request.call, Call::Poll { .. }) {
                    tokio::select! {
                        response = serve(&broker, &state, request) => response,
                        _ = closed(closing) => return,
                    }
                } else {
                    serve(&broker, &state, request).await
                };
                let _ = tx.send(response).await;
            });
        };

        // Pending polls belong to a peer that is gone; everything else runs
        // to completion so its joins are recorded before cleanup.
        let _ = closing_tx.send(true);
        while requests.join_next().await.is_some() {}

        let participants = state.lock().map(|mut s| s.close()).unwrap_or_default();
        if config.leave_on_disconnect {
            for participant in &participants {
                if broker.leave_participant(participant).await {
                    tracing::info!(
                        session_id = session_id,
                        participant = %participant.id,
                        "Left on disconnect"
                    );
                }
            }
        }

        drop(tx);
        let _ = writer.await;

        if let Ok(mut state) = state.lock() {
            state.finish();
            tracing::debug!(
                session_id = session_id,
                peer = %state.peer_addr,
                requests = state.requests,
                duration_ms = state.duration().as_millis() as u64,
                "Session finished"
            );
        }

        result
    }
}

/// Resolves once the connection starts closing
async fn closed(mut closing: watch::Receiver<bool>) {
    let _ = closing.wait_for(|closing| *closing).await;
}

/// Run one request against the broker
///
/// Joins and leaves also update the registrations owned by the session.
async fn serve(broker: &Broker, state: &Mutex<SessionState>, request: Request) -> Response {
    let Request { id, call } = request;

    tracing::debug!(request_id = id, call = call.name(), participant = call.identity(), "Request");

    let result = match &call {
        Call::Join { identity } => broker.join_participant(identity).await.map(|participant| {
            if let Ok(mut state) = state.lock() {
                state.on_join(participant);
            }
            Reply::Joined { ok: true }
        }),
        Call::Leave { identity } => {
            let result = dispatch(broker, &call).await;
            if result.is_ok() {
                if let Ok(mut state) = state.lock() {
                    state.on_leave(identity);
                }
            }
            result
        }
        _ => dispatch(broker, &call).await,
    };

    Response::from_result(id, result)
}

/// Map a call onto the broker
pub(crate) async fn dispatch(broker: &Broker, call: &Call) -> std::result::Result<Reply, BrokerError> {
    match call {
        Call::Join { identity } => broker.join(identity).await.map(|ok| Reply::Joined { ok }),
        Call::Leave { identity } => broker
            .leave(identity)
            .await
            .map(|found| Reply::Left { found }),
        Call::Send { identity, text } => broker
            .send(identity, text)
            .await
            .map(|ok| Reply::Sent { ok }),
        Call::Poll {
            identity,
            timeout_ms,
            max_batch,
        } => broker
            .poll(identity, *timeout_ms, *max_batch)
            .await
            .map(|messages| Reply::Messages { messages }),
    }
}

/// Encode responses onto the socket until every sender is dropped
async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<Response>, codec: FrameCodec)
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    while let Some(response) = rx.recv().await {
        buf.clear();
        if let Err(e) = codec.encode(&response, &mut buf) {
            tracing::warn!(request_id = response.id, error = %e, "Failed to encode response");
            let fallback = Response::bad_request(e.to_string());
            let fallback = Response { id: response.id, ..fallback };
            if codec.encode(&fallback, &mut buf).is_err() {
                continue;
            }
        }

        if let Err(e) = writer.write_all(&buf).await {
            tracing::debug!(error = %e, "Write failed");
            break;
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerConfig;
    use crate::protocol::{Outcome, DEFAULT_MAX_FRAME_SIZE};

    fn broker() -> Broker {
        Broker::with_config(BrokerConfig::default().disable_reaper())
    }

    #[tokio::test]
    async fn test_dispatch_join_and_send() {
        let broker = broker();
        let join = Call::Join {
            identity: "alice".into(),
        };
        let send = Call::Send {
            identity: "alice".into(),
            text: "hello".into(),
        };

        assert_eq!(dispatch(&broker, &join).await, Ok(Reply::Joined { ok: true }));
        assert_eq!(dispatch(&broker, &send).await, Ok(Reply::Sent { ok: true }));
    }

    #[tokio::test]
    async fn test_dispatch_poll_timeout() {
        let broker = broker();
        broker.join("alice").await.unwrap();
        let poll = Call::Poll {
            identity: "alice".into(),
            timeout_ms: 20,
            max_batch: 5,
        };

        assert_eq!(
            dispatch(&broker, &poll).await,
            Ok(Reply::Messages { messages: vec![] })
        );
    }

    #[tokio::test]
    async fn test_serve_tracks_identities() {
        let broker = broker();
        let addr = "127.0.0.1:9".parse().unwrap();
        let state = Mutex::new(SessionState::new(1, addr));
        let request = Request {
            id: 4,
            call: Call::Join {
                identity: "alice".into(),
            },
        };

        let response = serve(&broker, &state, request.clone()).await;
        assert_eq!(response.id, 4);
        assert!(matches!(response.outcome, Outcome::Ok { .. }));

        let again = serve(&broker, &state, request).await;
        assert!(matches!(
            again.outcome,
            Outcome::Error { ref code, .. } if code == "ALREADY_REGISTERED"
        ));

        let participants = state.lock().unwrap().close();
        assert_eq!(participants.len(), 1);
        let live = broker.registry().lookup("alice").await.unwrap();
        assert!(Arc::ptr_eq(&participants[0], &live));
    }

    #[tokio::test]
    async fn test_serve_leave_forgets_identity() {
        let broker = broker();
        let addr = "127.0.0.1:9".parse().unwrap();
        let state = Mutex::new(SessionState::new(1, addr));

        let join = Request {
            id: 1,
            call: Call::Join {
                identity: "alice".into(),
            },
        };
        let leave = Request {
            id: 2,
            call: Call::Leave {
                identity: "alice".into(),
            },
        };

        serve(&broker, &state, join).await;
        let response = serve(&broker, &state, leave).await;
        assert_eq!(response.outcome, Outcome::Ok { reply: Reply::Left { found: true } });
        assert_eq!(state.lock().unwrap().identities().count(), 0);
    }

    #[tokio::test]
    async fn test_write_responses_ignores_frame_limit() {
        let text = "x".repeat(DEFAULT_MAX_FRAME_SIZE);
        let response = Response::bad_request(text);
        let mut expected = serde_json::to_vec(&response).unwrap();
        expected.push(b'\n');
        assert!(expected.len() > DEFAULT_MAX_FRAME_SIZE);

        let mock = tokio_test::io::Builder::new().write(&expected).build();
        let (tx, rx) = mpsc::channel(4);
        tx.send(response).await.unwrap();
        drop(tx);

        write_responses(mock, rx, FrameCodec::unbounded()).await;
    }

    #[tokio::test]
    async fn test_write_responses() {
        let expected = b"{\"id\":1,\"result\":\"ok\",\"reply\":{\"type\":\"sent\",\"ok\":true}}\n";
        let mock = tokio_test::io::Builder::new().write(expected).build();
        let (tx, rx) = mpsc::channel(4);

        tx.send(Response::ok(1, Reply::Sent { ok: true })).await.unwrap();
        drop(tx);

        write_responses(mock, rx, FrameCodec::default()).await;
    }
}
