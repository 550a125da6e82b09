//! Per-socket session: registration, writer/reader/heartbeat tasks, and
//! exactly-once removal from the registry.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use chatpush_core::{AccountId, ClientFrame, ServerEvent};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::connection::{ChannelConnection, Connection};
use crate::heartbeat::{run_heartbeat, HeartbeatOutcome};
use crate::registry::ConnectionRegistry;
use crate::server::AppState;

/// Drive one upgraded socket until the client leaves, goes quiet, or the
/// server shuts down.
pub async fn run_connection(mut socket: WebSocket, account: Option<AccountId>, state: AppState) {
    let settings = &state.settings;
    let (conn, queue) = ChannelConnection::channel(settings.send_queue_capacity);
    let conn = Arc::new(conn);
    let conn_id = conn.id().clone();

    if let Err(e) = state.registry.connect(conn.clone(), account.as_ref()) {
        warn!(conn_id = %conn_id, error = %e, "rejecting websocket connection");
        let _ = socket.close().await;
        return;
    }

    let (sink, stream) = socket.split();
    let shutdown = state.shutdown.token().child_token();
    let session = CancellationToken::new();
    let interval = settings.heartbeat_interval();

    let mut writer = tokio::spawn(write_loop(sink, queue, interval, shutdown));
    let mut reader = tokio::spawn(read_loop(stream, conn.clone(), state.registry.clone()));
    let mut heartbeat = tokio::spawn(run_heartbeat(
        conn.clone(),
        interval,
        settings.heartbeat_timeout(),
        session.clone(),
    ));

    let reason = tokio::select! {
        _ = &mut writer => "writer finished",
        _ = &mut reader => "client closed",
        outcome = &mut heartbeat => match outcome {
            Ok(HeartbeatOutcome::TimedOut) => "heartbeat timed out",
            _ => "heartbeat stopped",
        },
        () = conn.broken() => "send failed",
    };

    session.cancel();
    writer.abort();
    reader.abort();
    heartbeat.abort();

    let _ = state.registry.disconnect(&conn_id, account.as_ref());
    info!(
        conn_id = %conn_id,
        reason,
        age_secs = conn.age().as_secs(),
        dropped = conn.drop_count(),
        "websocket session ended"
    );
}

/// Forward queued frames to the socket and ping it every `ping_every`.
///
/// Returns when the queue closes, the socket rejects a write, or `shutdown`
/// fires (after sending a going-away close frame).
pub(crate) async fn write_loop<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Arc<str>>,
    ping_every: Duration,
    shutdown: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_every);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(text) = next else { break };
                if sink.send(Message::Text(String::from(&*text).into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                trace!("sent ping");
            }
            () = shutdown.cancelled() => {
                let frame = CloseFrame {
                    code: close_code::AWAY,
                    reason: Utf8Bytes::from_static("server shutting down"),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        }
    }
}

/// Consume inbound frames: answer application pings, record liveness, stop
/// on close or a transport error.
pub(crate) async fn read_loop<St, E>(
    mut stream: St,
    conn: Arc<ChannelConnection>,
    registry: Arc<ConnectionRegistry>,
) where
    St: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                debug!(conn_id = %conn.id(), error = %e, "websocket read error");
                break;
            }
        };
        conn.mark_alive();

        match msg {
            Message::Text(text) => {
                if let Some(ClientFrame::Ping) = ClientFrame::parse(text.as_str()) {
                    let _ = registry.send_to_one(conn.as_ref(), &ServerEvent::Pong).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}
