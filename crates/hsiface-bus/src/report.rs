//! The Report channel: Publisher and every Worker → Sender, many-to-one
//! push/pull. The server side only ever receives; every
//! decoded [`ReportMessage`] is forwarded onto an `mpsc` channel so the
//! Sender's serializer thread can drain it without ever touching a socket itself.

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
use hsiface_protocol::ReportMessage;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message as ClientMessage;
use tracing::{info, warn};

/// Server side: accepts WebSocket connections at `/report` and forwards
/// every parsed message onto `sink`. One `ReportIngest` serves every
/// connected Publisher/Worker; `sink` is typically the bridging channel
/// feeding the Sender's serializer thread.
#[derive(Clone)]
pub struct ReportIngest {
    sink: mpsc::Sender<ReportMessage>,
}

impl ReportIngest {
    pub fn new(sink: mpsc::Sender<ReportMessage>) -> Self {
        ReportIngest { sink }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/report", get(report_ws_handler))
            .with_state(self)
    }
}

async fn report_ws_handler(ws: WebSocketUpgrade, State(ingest): State<ReportIngest>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_reporter(socket, ingest))
}

async fn serve_reporter(mut socket: WebSocket, ingest: ReportIngest) {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ReportMessage>(&text) {
                Ok(msg) => {
                    if ingest.sink.send(msg).await.is_err() {
                        warn!("report sink closed, dropping reporter connection");
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "malformed report message, ignoring");
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = socket.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                info!("reporter disconnected");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "report socket error");
                break;
            }
        }
    }
}

/// Client side, used by both the Publisher (one INITIAL per request) and
/// every Worker (STARTED/WORKING/DONE/FAILED per hub-leg).
pub struct ReportClient {
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

impl ReportClient {
    pub async fn connect(url: &str) -> Result<Self, ReportClientError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ReportClientError::Connect(e.to_string()))?;
        Ok(ReportClient { ws })
    }

    pub async fn send(&mut self, msg: &ReportMessage) -> Result<(), ReportClientError> {
        let json =
            serde_json::to_string(msg).map_err(|e| ReportClientError::Serialization(e.to_string()))?;
        self.ws
            .send(ClientMessage::Text(json.into()))
            .await
            .map_err(|e| ReportClientError::Ws(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportClientError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    Ws(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsiface_protocol::MsgType;

    fn sample() -> ReportMessage {
        ReportMessage {
            msgtype: MsgType::Started,
            request_id: "r1".into(),
            username: "u".into(),
            prefix: "SNALERT".into(),
            start_ticks: Some(0),
            stop_ticks: Some(10),
            copy_dir: None,
            destination_dir: "/dest".into(),
            extract: false,
            host: "ichub01".into(),
            hubs: None,
            version: 1,
            reason: None,
        }
    }

    #[tokio::test]
    async fn well_formed_text_frame_reaches_the_sink() {
        let (tx, mut rx) = mpsc::channel(8);
        let ingest = ReportIngest::new(tx);
        let json = serde_json::to_string(&sample()).unwrap();
        // Exercise the parse/forward path directly; a full WebSocketUpgrade
        // round trip needs a live listener and is covered by the
        // integration tests instead.
        let msg: ReportMessage = serde_json::from_str(&json).unwrap();
        ingest.sink.send(msg).await.unwrap();
        let got = rx.recv().await.unwrap();
        assert_eq!(got, sample());
    }
}
