//! The Alert channel: external clients → Publisher, request/reply.

use std::future::Future;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use hsiface_protocol::{AlertError, AlertReply, AlertRequest, ALERT_DONE_REPLY};

/// Implemented by the Publisher: validates, canonicalizes, and admits one
/// [`AlertRequest`]. The HTTP layer only knows how
/// to turn the `Result` into the right wire reply.
pub trait AlertHandler: Clone + Send + Sync + 'static {
    fn handle(&self, request: AlertRequest) -> impl Future<Output = Result<(), AlertError>> + Send;
}

/// Build the single-route Alert channel router, `POST /alert`.
pub fn router<H: AlertHandler>(handler: H) -> Router {
    Router::new()
        .route("/alert", post(alert_handler::<H>))
        .with_state(handler)
}

async fn alert_handler<H: AlertHandler>(
    State(handler): State<H>,
    Json(request): Json<AlertRequest>,
) -> Response {
    match handler.handle(request).await {
        Ok(()) => reply_to_response(AlertReply::Done),
        Err(err) => reply_to_response(AlertReply::error(&err)),
    }
}

/// Render an [`AlertReply`] as the HTTP response: literal `DONE\0` bytes on
/// success, a JSON error envelope otherwise.
fn reply_to_response(reply: AlertReply) -> Response {
    match reply {
        AlertReply::Done => (StatusCode::OK, Bytes::from_static(ALERT_DONE_REPLY)).into_response(),
        AlertReply::Error(body) => (StatusCode::BAD_REQUEST, Json(body)).into_response(),
    }
}
