//! Per-downstream session: the websocket and its worker tasks.
//!
//! # Responsibilities
//! - Own the upgraded websocket for one registered app
//! - Pump frames between the relay's queues and the wire
//! - Keep the connection alive and tear everything down exactly once
//!
//! # Data Flow
//! ```text
//! proxy handler ──▶ from_upstream (cap 10) ──▶ writer ──▶ websocket
//! websocket ──▶ reader ──▶ from_downstream (cap 10) ──▶ correlator
//! keepalive ──▶ PING every 10s (5s write deadline)
//! supervisor: first worker exit or shutdown signal ⇒ destroy
//! ```
//!
//! # Design Decisions
//! - The write half sits behind a mutex held only across one send, so the
//!   writer and the keepalive cannot interleave frames
//! - Queue halves are owned by the tasks that drain them; a task exiting
//!   closes its queue exactly once
//! - Destroy is gated by an atomic once-guard and is safe to call from any
//!   task at any time

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::timeout;

use crate::codec::{self, Frame, Payload};
use crate::server::registry::AppRegistry;

/// Capacity of each per-session queue; sends beyond it block (backpressure).
const QUEUE_CAPACITY: usize = 10;

const PING_INTERVAL: Duration = Duration::from_secs(10);
const PING_WRITE_DEADLINE: Duration = Duration::from_secs(5);

type WsSink = Arc<Mutex<SplitSink<WebSocket, WsMessage>>>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
    #[error("websocket transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Codec(#[from] codec::CodecError),
}

/// Handle to one downstream's live session.
///
/// The registry holds sessions by `Arc`; each session holds only a `Weak`
/// back-reference so the two never form an owning cycle.
#[derive(Debug)]
pub struct AppSession {
    app_id: String,
    from_upstream: mpsc::Sender<Frame>,
    shutdown: watch::Sender<bool>,
    destroyed: AtomicBool,
    registry: Weak<AppRegistry>,
}

/// Channel ends handed to the worker tasks and the correlator.
pub(crate) struct SessionParts {
    pub(crate) upstream_rx: mpsc::Receiver<Frame>,
    pub(crate) downstream_tx: mpsc::Sender<Frame>,
    pub(crate) downstream_rx: mpsc::Receiver<Frame>,
}

impl AppSession {
    /// Build a session around an upgraded websocket and start its workers.
    /// Returns the session handle and the inbound queue for the correlator.
    pub fn spawn(
        app_id: String,
        socket: WebSocket,
        registry: Weak<AppRegistry>,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (session, parts) = Self::detached(app_id, registry);
        Self::start(&session, socket, parts.upstream_rx, parts.downstream_tx);
        (session, parts.downstream_rx)
    }

    /// Session state without a websocket or workers. The building block for
    /// `spawn`; used directly by tests that only need lifecycle semantics.
    pub(crate) fn detached(
        app_id: String,
        registry: Weak<AppRegistry>,
    ) -> (Arc<Self>, SessionParts) {
        let (upstream_tx, upstream_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (downstream_tx, downstream_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        let session = Arc::new(Self {
            app_id,
            from_upstream: upstream_tx,
            shutdown: shutdown_tx,
            destroyed: AtomicBool::new(false),
            registry,
        });

        (
            session,
            SessionParts {
                upstream_rx,
                downstream_tx,
                downstream_rx,
            },
        )
    }

    fn start(
        session: &Arc<Self>,
        socket: WebSocket,
        upstream_rx: mpsc::Receiver<Frame>,
        downstream_tx: mpsc::Sender<Frame>,
    ) {
        let (sink, stream) = socket.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        let mut writer = tokio::spawn(write_downstream(
            sink.clone(),
            upstream_rx,
            session.shutdown.subscribe(),
        ));
        let mut reader = tokio::spawn(read_downstream(
            stream,
            downstream_tx,
            session.shutdown.subscribe(),
        ));
        let mut keepalive = tokio::spawn(keep_downstream_alive(
            sink.clone(),
            session.shutdown.subscribe(),
        ));

        let session = session.clone();
        let mut shutdown_rx = session.shutdown.subscribe();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                res = &mut writer => ("writer", flatten(res)),
                res = &mut reader => ("reader", flatten(res)),
                res = &mut keepalive => ("keepalive", flatten(res)),
                _ = shutdown_rx.changed() => ("shutdown", Ok(())),
            };

            match outcome {
                (task, Err(err)) => {
                    tracing::error!(app_id = %session.app_id, task, error = %err, "session worker failed");
                }
                (task, Ok(())) => {
                    tracing::debug!(app_id = %session.app_id, task, "session worker finished");
                }
            }

            session.destroy();

            writer.abort();
            reader.abort();
            keepalive.abort();

            // Last writer standing closes the socket.
            let mut sink = sink.lock().await;
            let _ = sink.send(WsMessage::Close(None)).await;
            let _ = sink.close().await;
        });
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Enqueue a frame for the downstream. Blocks when the queue is full;
    /// fails once the session has been destroyed.
    pub async fn write_to_downstream(&self, frame: Frame) -> Result<(), SessionError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(SessionError::Closed);
        }
        self.from_upstream
            .send(frame)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Tear the session down: signal shutdown, let the workers close their
    /// queue halves and the websocket, drop the registry entry. Idempotent;
    /// the cleanup runs exactly once no matter how many callers race here.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown.send(true);

        if let Some(registry) = self.registry.upgrade() {
            registry.delete(&self.app_id);
        }

        tracing::info!(app_id = %self.app_id, "session destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

fn flatten(res: Result<Result<(), SessionError>, tokio::task::JoinError>) -> Result<(), SessionError> {
    match res {
        Ok(inner) => inner,
        Err(join_err) => Err(SessionError::Transport(join_err.to_string())),
    }
}

/// T1: drain `from_upstream`, encode, write binary frames. Only request
/// payloads belong on this path; anything else is dropped with a warning.
async fn write_downstream(
    sink: WsSink,
    mut upstream_rx: mpsc::Receiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SessionError> {
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            frame = upstream_rx.recv() => match frame {
                Some(frame) => frame,
                None => return Ok(()),
            },
        };

        if !matches!(frame.payload, Payload::Request(_)) {
            tracing::warn!(message_id = %frame.message_id, "dropping non-request frame bound downstream");
            continue;
        }

        let encoded = codec::encode(&frame)?;

        let mut sink = sink.lock().await;
        sink.send(WsMessage::Binary(Bytes::from(encoded)))
            .await
            .map_err(|err| SessionError::Transport(err.to_string()))?;
    }
}

/// T2: read binary frames, decode, forward inbound. A full queue blocks the
/// read loop until the correlator drains it.
async fn read_downstream(
    mut stream: SplitStream<WebSocket>,
    downstream_tx: mpsc::Sender<Frame>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SessionError> {
    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            message = stream.next() => match message {
                Some(Ok(message)) => message,
                Some(Err(err)) => return Err(SessionError::Transport(err.to_string())),
                None => return Ok(()),
            },
        };

        match message {
            WsMessage::Binary(data) => {
                let frame = codec::decode(&data)?;
                if downstream_tx.send(frame).await.is_err() {
                    return Ok(());
                }
            }
            WsMessage::Close(_) => return Ok(()),
            // PONGs (and any stray text) are read activity, nothing more.
            _ => {}
        }
    }
}

/// T3: PING every `PING_INTERVAL` with a hard write deadline. An unresponsive
/// peer surfaces here or as a read error on T2, whichever trips first.
async fn keep_downstream_alive(
    sink: WsSink,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SessionError> {
    let mut ticker = tokio::time::interval(PING_INTERVAL);
    ticker.tick().await; // first tick is immediate

    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            _ = ticker.tick() => {}
        }

        let ping = async {
            let mut sink = sink.lock().await;
            sink.send(WsMessage::Ping(Bytes::new())).await
        };

        match timeout(PING_WRITE_DEADLINE, ping).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(SessionError::Transport(err.to_string())),
            Err(_) => {
                return Err(SessionError::Transport("ping write deadline exceeded".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Request;

    fn request_frame(id: &str) -> Frame {
        Frame {
            message_id: id.to_string(),
            payload: Payload::Request(Request {
                id: id.to_string(),
                method: "GET".to_string(),
                path: "/".to_string(),
                ..Request::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_write_fails_after_destroy() {
        let (session, _parts) = AppSession::detached("test-app".to_string(), Weak::new());

        session.write_to_downstream(request_frame("m1")).await.unwrap();
        session.destroy();

        let err = session.write_to_downstream(request_frame("m2")).await.unwrap_err();
        assert!(matches!(err, SessionError::Closed));
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let registry = AppRegistry::new();
        let (session, _parts) =
            AppSession::detached("dawn-fog-a1b2c".to_string(), Arc::downgrade(&registry));
        registry.insert(session.clone()).unwrap();
        assert!(registry.contains("dawn-fog-a1b2c"));

        session.destroy();
        session.destroy();
        session.destroy();

        assert!(session.is_destroyed());
        assert!(!registry.contains("dawn-fog-a1b2c"));
    }

    #[tokio::test]
    async fn test_destroy_fires_shutdown_signal() {
        let (session, _parts) = AppSession::detached("x".to_string(), Weak::new());
        let mut shutdown = session.shutdown.subscribe();

        session.destroy();

        shutdown.changed().await.unwrap();
        assert!(*shutdown.borrow());
    }

    #[tokio::test]
    async fn test_registry_roundtrip_with_sessions() {
        let registry = AppRegistry::new();
        let (session, _parts) =
            AppSession::detached("pale-sea-00000".to_string(), Arc::downgrade(&registry));

        registry.insert(session.clone()).unwrap();
        let fetched = registry.get("pale-sea-00000").unwrap();
        assert_eq!(fetched.app_id(), "pale-sea-00000");

        // Duplicate registration is rejected.
        let (dup, _dup_parts) =
            AppSession::detached("pale-sea-00000".to_string(), Arc::downgrade(&registry));
        assert!(registry.insert(dup).is_err());

        registry.delete("pale-sea-00000");
        assert!(registry.get("pale-sea-00000").is_none());

        // Deleting an absent id is a no-op.
        registry.delete("pale-sea-00000");
    }
}
