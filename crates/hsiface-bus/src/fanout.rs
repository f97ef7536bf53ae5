//! The Fan-out channel: Publisher → every Worker, publish/subscribe.
//! The hub side follows a subscribe-and-broadcast pattern keyed by a single
//! shared channel; the client side runs a connect/recv session against it.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use hsiface_protocol::FanoutMessage;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::Message as ClientMessage;
use tracing::{info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// The Publisher-side broadcast hub. Every admitted request is published
/// once; every connected Worker socket gets its own receiver.
#[derive(Clone)]
pub struct FanoutHub {
    tx: broadcast::Sender<FanoutMessage>,
}

impl FanoutHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        FanoutHub { tx }
    }

    /// Publish one canonicalized request to every connected Worker. Returns
    /// the number of currently-subscribed Workers (0 is not an error: a
    /// Worker that reconnects later simply misses requests published while
    /// it was down).
    pub fn publish(&self, message: FanoutMessage) -> usize {
        self.tx.send(message).unwrap_or(0)
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/fanout", get(fanout_ws_handler))
            .with_state(self)
    }
}

async fn fanout_ws_handler(ws: WebSocketUpgrade, State(hub): State<FanoutHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_subscriber(socket, hub))
}

async fn serve_subscriber(mut socket: WebSocket, hub: FanoutHub) {
    let mut rx = hub.tx.subscribe();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(fanout) => {
                        let Ok(json) = serde_json::to_string(&fanout) else { continue };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "fan-out subscriber lagged, some requests were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(data))) => { let _ = socket.send(Message::Pong(data)).await; }
                    Some(Ok(Message::Close(_))) | None => { info!("fan-out subscriber disconnected"); break; }
                    Some(Err(e)) => { warn!(error = %e, "fan-out subscriber socket error"); break; }
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// The Worker-side subscriber. Filters down to [`FanoutMessage`]s that
/// target this Worker's host.
pub struct FanoutClient {
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    host: String,
}

impl FanoutClient {
    pub async fn connect(url: &str, host: impl Into<String>) -> Result<Self, FanoutClientError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| FanoutClientError::Connect(e.to_string()))?;
        Ok(FanoutClient {
            ws,
            host: host.into(),
        })
    }

    /// Block until the next [`FanoutMessage`] targeting this Worker arrives.
    pub async fn recv(&mut self) -> Result<FanoutMessage, FanoutClientError> {
        loop {
            match self.ws.next().await {
                None => return Err(FanoutClientError::Disconnected),
                Some(Err(e)) => return Err(FanoutClientError::Ws(e.to_string())),
                Some(Ok(ClientMessage::Text(text))) => {
                    let msg: FanoutMessage = serde_json::from_str(&text)
                        .map_err(|e| FanoutClientError::Protocol(e.to_string()))?;
                    if msg.targets(&self.host) {
                        return Ok(msg);
                    }
                }
                Some(Ok(ClientMessage::Ping(data))) => {
                    let _ = self.ws.send(ClientMessage::Pong(data)).await;
                }
                Some(Ok(ClientMessage::Close(_))) => return Err(FanoutClientError::Disconnected),
                Some(Ok(_)) => {}
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FanoutClientError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    Ws(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("websocket disconnected")]
    Disconnected,
}
