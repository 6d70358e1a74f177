//! Video WebSocket and stream reset endpoints

use async_trait::async_trait;
use autoglm_stream::{RelayOutcome, ViewerClosed, ViewerSink};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::AppState;

pub fn create_video_router() -> Router<AppState> {
    Router::new()
        .route("/api/video/stream", get(stream_handler))
        .route("/api/video/reset", post(reset_stream))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceQuery {
    pub device_id: Option<String>,
}

impl DeviceQuery {
    fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref().filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: String,
}

/// Sends relayed frames as binary messages and errors as `{"error": ...}`.
///
/// The receive half is drained by a watcher task so client Close frames are
/// answered and a departed viewer is noticed on the next send.
struct WebSocketSink {
    sender: SplitSink<WebSocket, Message>,
    closed: CancellationToken,
}

impl WebSocketSink {
    fn new(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        let closed = CancellationToken::new();
        tokio::spawn(watch_viewer(receiver, closed.clone()));
        Self { sender, closed }
    }

    /// Finish the close handshake, replying to the client's Close if it sent one.
    async fn close(mut self) {
        self.closed.cancel();
        if let Err(e) = self.sender.close().await {
            debug!(error = %e, "WebSocket already closed");
        }
    }
}

/// Read client messages until the viewer goes away. Anything it sends
/// other than Close is ignored.
async fn watch_viewer(mut receiver: SplitStream<WebSocket>, closed: CancellationToken) {
    loop {
        tokio::select! {
            () = closed.cancelled() => break,
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Viewer sent close");
                    break;
                }
                Some(Err(e)) => {
                    debug!(error = %e, "Viewer socket error");
                    break;
                }
                None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    closed.cancel();
}

#[async_trait]
impl ViewerSink for WebSocketSink {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), ViewerClosed> {
        if self.closed.is_cancelled() {
            return Err(ViewerClosed);
        }
        tokio::select! {
            biased;
            () = self.closed.cancelled() => Err(ViewerClosed),
            sent = self.sender.send(Message::Binary(frame)) => sent.map_err(|_| ViewerClosed),
        }
    }

    async fn send_error(&mut self, message: &str) {
        if self.closed.is_cancelled() {
            return;
        }
        let body = serde_json::json!({ "error": message }).to_string();
        if let Err(e) = self.sender.send(Message::Text(body.into())).await {
            debug!(error = %e, "Could not deliver error to viewer");
        }
    }
}

pub async fn stream_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<DeviceQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_stream(socket, query, state))
}

async fn handle_stream(socket: WebSocket, query: DeviceQuery, state: AppState) {
    let mut sink = WebSocketSink::new(socket);

    let Some(device_id) = query.device_id() else {
        sink.send_error("device_id is required").await;
        sink.close().await;
        return;
    };

    let (key, identity) = state.identities.key_for(device_id).await;
    info!(device_id, key = %key, "Viewer connected");

    match state.relay.run(&key, &identity, &mut sink).await {
        RelayOutcome::ViewerDisconnected { forwarded } => {
            info!(device_id, forwarded, "Viewer disconnected");
        }
        RelayOutcome::StreamFailed { forwarded, error } => {
            warn!(device_id, forwarded, error = %error, "Stream failed");
        }
        RelayOutcome::AttachFailed(error) => {
            warn!(device_id, error = %error, "Viewer could not attach");
        }
    }

    sink.close().await;
}

/// Stop one device's capture session, or all of them without `device_id`.
pub async fn reset_stream(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Json<ResetResponse> {
    let registry = state.registry();

    let Some(device_id) = query.device_id() else {
        let stopped = registry.reset(None).await;
        info!(stopped, "Reset all video streams");
        return Json(ResetResponse {
            success: true,
            message: "All video streams reset".to_string(),
        });
    };

    let (key, _) = state.identities.key_for(device_id).await;
    let message = if registry.reset(Some(&key)).await > 0 {
        format!("Video stream reset for device {device_id}")
    } else {
        format!("No active video stream for device {device_id}")
    };
    Json(ResetResponse {
        success: true,
        message,
    })
}
