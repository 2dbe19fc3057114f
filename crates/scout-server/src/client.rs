//! WebSocket connection lifecycle: one session per connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};

use scout_core::notifications::{ClientMessage, Notification};
use scout_core::SessionId;
use scout_engine::EngineError;

use crate::context::AppContext;

/// Milliseconds since the connection opened at which the client was last heard from.
struct Liveness {
    opened: Instant,
    last_seen_ms: AtomicU64,
}

impl Liveness {
    fn new() -> Self {
        Self {
            opened: Instant::now(),
            last_seen_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.opened.elapsed().as_millis() as u64;
        self.last_seen_ms.store(now, Ordering::Relaxed);
    }

    fn silent_for(&self) -> Duration {
        let last = self.last_seen_ms.load(Ordering::Relaxed);
        let now = self.opened.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(last))
    }
}

/// Drive one WebSocket connection until either side goes away.
pub async fn handle_ws_connection(socket: WebSocket, ctx: AppContext) {
    let (session_id, mut outbound) = ctx.coordinator.connect();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let heartbeat = Duration::from_secs(ctx.server.heartbeat_interval_secs.max(1));
    let client_timeout = Duration::from_secs(ctx.server.client_timeout_secs);
    let liveness = Arc::new(Liveness::new());
    let shutdown = ctx.shutdown_token();

    let greeting = Notification::Connected {
        session_id: session_id.clone(),
    };
    match greeting.to_json() {
        Ok(json) => {
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                ctx.coordinator.disconnect(&session_id);
                return;
            }
        }
        Err(e) => warn!(error = %e, "failed to encode connected notification"),
    }

    // Writer: outbound notifications, heartbeat pings and the idle check.
    let writer_sid = session_id.clone();
    let writer_liveness = Arc::clone(&liveness);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(heartbeat);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = ws_tx.send(WsMessage::Close(None)).await;
                    break;
                }
                next = outbound.recv() => {
                    let Some(notification) = next else { break };
                    let json = match notification.to_json() {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(session_id = %writer_sid, kind = notification.kind(), error = %e, "failed to encode notification");
                            continue;
                        }
                    };
                    if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if writer_liveness.silent_for() > client_timeout {
                        info!(session_id = %writer_sid, "client timed out");
                        let _ = ws_tx.send(WsMessage::Close(None)).await;
                        break;
                    }
                    if ws_tx.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                    trace!(session_id = %writer_sid, "sent ping");
                }
            }
        }
    });

    // Reader: inbound frames become turns.
    let reader_ctx = ctx.clone();
    let reader_sid = session_id.clone();
    let reader_liveness = Arc::clone(&liveness);
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            reader_liveness.touch();
            match msg {
                WsMessage::Text(text) => handle_frame(&reader_ctx, &reader_sid, text.as_str()),
                WsMessage::Binary(_) => warn!(session_id = %reader_sid, "binary frame ignored"),
                WsMessage::Close(_) => break,
                // Pong replies are automatic; both still count as liveness.
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    ctx.coordinator.disconnect(&session_id);
    info!(session_id = %session_id, "websocket closed");
}

/// Parse one inbound text frame and submit it. Malformed frames are skipped.
fn handle_frame(ctx: &AppContext, session_id: &SessionId, raw: &str) {
    let message = match serde_json::from_str::<ClientMessage>(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "malformed client frame skipped");
            return;
        }
    };

    match message {
        ClientMessage::SendChatMessage { message } => match ctx.coordinator.submit(session_id, message) {
            Ok(handle) => debug!(session_id = %session_id, turn_id = %handle.turn_id, "turn queued"),
            Err(EngineError::EmptyMessage) => warn!(session_id = %session_id, "empty chat message skipped"),
            Err(e) => warn!(session_id = %session_id, error = %e, "could not submit turn"),
        },
    }
}
