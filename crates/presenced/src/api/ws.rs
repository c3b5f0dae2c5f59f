//! Persistent-connection ingress over WebSocket.
//!
//! Frames are JSON `{"event": ..., "data": ...}` envelopes. A peer submits
//! `face-detected` and gets `face-recognition-result` back; every peer
//! receives `attendance-update` and `cctv-status-update` fan-out.

use super::{AppState, RecognitionResponse};
use crate::broadcast::{BroadcastEvent, CameraStatus};
use crate::pipeline::RecognizeRequest;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Local};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Frames queued per peer before fan-out to that peer starts lagging.
const OUTBOUND_BUFFER: usize = 32;

#[derive(Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum ClientMessage {
    FaceDetected(RecognizeRequest),
    CctvStatus(CameraStatus),
}

#[derive(Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
enum ServerMessage {
    Connected {
        message: &'static str,
        timestamp: DateTime<Local>,
    },
    FaceRecognitionResult(RecognitionResponse),
    Error {
        message: String,
    },
}

fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode websocket frame");
            None
        }
    }
}

/// GET /ws
pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| session(socket, state))
}

async fn session(socket: WebSocket, state: AppState) {
    let peer = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let mut updates = state.broadcaster.subscribe();
    tracing::info!(%peer, subscribers = state.broadcaster.subscriber_count(), "peer connected");

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let fanout_tx = out_tx.clone();
    let fanout = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(event) => {
                    let Some(text) = encode(&event) else { continue };
                    if fanout_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%peer, skipped, "peer lagging; fan-out events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let hello = ServerMessage::Connected {
        message: "Connected to attendance system",
        timestamp: state.clock.now(),
    };
    if let Some(text) = encode(&hello) {
        let _ = out_tx.send(text).await;
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(&state, &out_tx, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%peer, error = %e, "websocket receive failed");
                break;
            }
        }
    }

    // Submissions already in flight keep their own sender and finish;
    // their replies are dropped once the writer is gone.
    fanout.abort();
    drop(out_tx);
    let _ = writer.await;
    tracing::info!(%peer, "peer disconnected");
}

async fn handle_text(state: &AppState, out_tx: &mpsc::Sender<String>, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::FaceDetected(request)) => {
            let pipeline = state.pipeline.clone();
            let reply = out_tx.clone();
            tokio::spawn(async move {
                let (_, body) = RecognitionResponse::from_result(pipeline.submit(request).await);
                if let Some(text) = encode(&ServerMessage::FaceRecognitionResult(body)) {
                    let _ = reply.send(text).await;
                }
            });
        }
        Ok(ClientMessage::CctvStatus(status)) => {
            tracing::debug!(camera_id = %status.camera_id, status = %status.status, "camera status relayed");
            state.broadcaster.publish(BroadcastEvent::CctvStatusUpdate(status));
        }
        Err(e) => {
            let frame = ServerMessage::Error {
                message: format!("unrecognized message: {e}"),
            };
            if let Some(text) = encode(&frame) {
                let _ = out_tx.send(text).await;
            }
        }
    }
}
