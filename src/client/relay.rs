//! Relay client: registration and the websocket message loop.
//!
//! # Responsibilities
//! - Dial the bore server's `/register` endpoint and learn the app id
//! - Serve framed requests one at a time against the local upstream
//! - Answer keepalive PINGs and echo the server's close
//!
//! # Design Decisions
//! - The message loop is serial: one request in flight per client keeps the
//!   websocket framing trivially ordered
//! - Upstream failures answer 502 through the tunnel and keep the loop
//!   running; transport and decode failures end the client, and
//!   reconnecting is the operator's call
//! - All websocket writes go through one mutex so the close echo and
//!   response frames never interleave

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::client::upstream;
use crate::codec::{self, Frame, Payload};
use crate::config::ClientConfig;
use crate::server::APP_ID_HEADER;
use crate::traffic::TrafficLog;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid upstream url: {0}")]
    InvalidUpstream(#[from] url::ParseError),
    #[error("upstream url must be http or https, got {0}")]
    UnsupportedScheme(String),
    #[error("refusing to proxy non-localhost targets by default; use --allow-external to override")]
    RemoteUpstreamRefused,
    #[error("upstream call failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("registration response carried no x-bore-app-id header")]
    MissingAppId,
    #[error("unsupported request method {0}")]
    InvalidMethod(String),
    #[error(transparent)]
    Codec(#[from] codec::CodecError),
}

/// What the rest of the program needs to know once the tunnel is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub app_id: String,
    pub public_url: String,
}

/// The downstream end of one tunnel.
#[derive(Debug)]
pub struct BoreClient {
    config: ClientConfig,
    http: reqwest::Client,
    base_url: Url,
    traffic: Arc<TrafficLog>,
    ready: watch::Sender<Option<ClientInfo>>,
}

impl BoreClient {
    /// Validate the upstream and prepare the client. The returned watch
    /// channel yields `Some(ClientInfo)` once registration completes; it
    /// closes without a value if the client dies first.
    pub fn new(
        config: ClientConfig,
        traffic: Arc<TrafficLog>,
    ) -> Result<(Self, watch::Receiver<Option<ClientInfo>>), ClientError> {
        let base_url = upstream::validate_upstream(&config.upstream_url, config.allow_external)?;
        let http = reqwest::Client::builder().build()?;
        let (ready, ready_rx) = watch::channel(None);

        Ok((
            Self {
                config,
                http,
                base_url,
                traffic,
                ready,
            },
            ready_rx,
        ))
    }

    /// Register with the server and serve requests until the connection
    /// ends. Consumes the client; the websocket is closed on every exit.
    pub async fn run(self) -> Result<(), ClientError> {
        let endpoint = format!(
            "{}://{}/register",
            self.config.ws_scheme, self.config.server_host
        );
        tracing::info!(endpoint = %endpoint, upstream = %self.base_url, "dialing bore server");

        let (ws, handshake) = connect_async(&endpoint).await?;

        let app_id = handshake
            .headers()
            .get(APP_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(ClientError::MissingAppId)?;

        let info = ClientInfo {
            public_url: public_url(&self.config.server_host, &app_id),
            app_id,
        };
        tracing::info!(app_id = %info.app_id, public_url = %info.public_url, "tunnel established");
        let _ = self.ready.send(Some(info));

        self.message_loop(ws).await
    }

    async fn message_loop(&self, ws: WsStream) -> Result<(), ClientError> {
        let (sink, mut stream) = ws.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        while let Some(message) = stream.next().await {
            match message? {
                Message::Binary(data) => self.handle_frame(&data, &sink).await?,
                Message::Ping(payload) => {
                    sink.lock().await.send(Message::Pong(payload)).await?;
                }
                Message::Close(frame) => {
                    let _ = sink.lock().await.send(Message::Close(frame)).await;
                    break;
                }
                _ => {}
            }
        }

        tracing::info!("server connection closed");
        Ok(())
    }

    /// One request frame: replay against the upstream, log both halves,
    /// answer under the original message id.
    async fn handle_frame(&self, data: &[u8], sink: &WsSink) -> Result<(), ClientError> {
        let frame = codec::decode(data)?;

        let Payload::Request(request) = frame.payload else {
            tracing::warn!(message_id = %frame.message_id, "unexpected response frame from server, discarding");
            return Ok(());
        };

        tracing::debug!(
            message_id = %frame.message_id,
            method = %request.method,
            path = %request.path,
            "relaying request to upstream"
        );

        self.traffic.log_request(&request);

        let response = match upstream::call(&self.http, &self.base_url, &request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(message_id = %frame.message_id, error = %err, "upstream call failed, answering 502");
                upstream::bad_gateway(&request, &err)
            }
        };

        self.traffic.log_response(&response);

        let reply = Frame {
            message_id: frame.message_id,
            payload: Payload::Response(response),
        };
        let encoded = codec::encode(&reply)?;

        sink.lock().await.send(Message::Binary(encoded.into())).await?;
        Ok(())
    }
}

/// Public URL for an app id: the server host keeps its own name unless it
/// already carries a subdomain, in which case the first label gives way to
/// the app id.
pub fn public_url(server_host: &str, app_id: &str) -> String {
    let labels: Vec<&str> = server_host.split('.').collect();
    let domain = if labels.len() > 2 {
        labels[1..].join(".")
    } else {
        server_host.to_string()
    };
    format!("https://{app_id}.{domain}")
}
