//! WebSocket feeds: the fleet status push and per-container log follows.
//!
//! Both feeds end when the client goes away. For logs the socket closing
//! makes the forward loop drop the stream, which the producer observes on
//! its next send; for status the dropped receiver stops the poller at its
//! next tick.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use dockhand_backend::{backend_for, StatusPoller};
use dockhand_common::StatusEvent;

use crate::{backend, follow_tail, AppState, LogsParams};

pub async fn log_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((host, id)): Path<(String, String)>,
    Query(params): Query<LogsParams>,
) -> Response {
    let tail = follow_tail(&params);
    ws.on_upgrade(move |socket| follow_logs(socket, state, host, id, tail))
}

async fn follow_logs(
    mut socket: WebSocket,
    state: AppState,
    host: String,
    id: String,
    tail: dockhand_common::Tail,
) {
    let stream = match backend(&state, &host) {
        Ok(backend) => backend.stream_logs(&id, tail).await,
        Err(e) => {
            let _ = socket
                .send(Message::Text(format!("Error: {}", e.0)))
                .await;
            let _ = socket.close().await;
            return;
        }
    };
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = socket.send(Message::Text(format!("Error: {e}"))).await;
            let _ = socket.close().await;
            return;
        }
    };

    loop {
        tokio::select! {
            chunk = stream.next_chunk() => match chunk {
                Some(chunk) => {
                    if socket.send(Message::Text(chunk.text)).await.is_err() {
                        debug!(host = %host, id = %id, "log subscriber disconnected");
                        return;
                    }
                }
                // Producer finished; tell the client this was a clean end.
                None => {
                    let _ = socket.close().await;
                    return;
                }
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(host = %host, id = %id, "log subscriber closed the socket");
                    return;
                }
                // Pings are answered by axum; other frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}

pub async fn status_feed_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| push_status(socket, state))
}

async fn push_status(mut socket: WebSocket, state: AppState) {
    let registry = state.registry.clone();
    let poller = StatusPoller::new(move || registry.list(), backend_for);

    let (tx, mut rx) = mpsc::channel::<StatusEvent>(16);
    tokio::spawn(poller.run(tx));

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "dropping unserializable status event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(frame)).await.is_err() {
                        debug!("status subscriber disconnected");
                        return;
                    }
                }
                None => return,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!("status subscriber closed the socket");
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
