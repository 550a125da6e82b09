//! WebSocket client connection state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatpush_core::{ConnectionId, SendError};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A text-message channel to one client.
///
/// The registry only ever sends through this trait; it never closes a
/// connection. Whoever created the connection owns its socket.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identity for the lifetime of the socket.
    fn id(&self) -> &ConnectionId;

    /// Deliver one already-encoded text frame.
    async fn send_text(&self, text: Arc<str>) -> Result<(), SendError>;
}

/// Connection backed by a bounded queue drained by the socket's writer task.
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<str>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    dropped_messages: AtomicU64,
    /// Fires on the first failed send; the stream is no longer complete.
    broken: CancellationToken,
}

impl ChannelConnection {
    /// Create a new connection around the sending half of its queue.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            broken: CancellationToken::new(),
        }
    }

    /// Create a connection with a fresh id and a queue of `capacity` frames.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(ConnectionId::new(), tx), rx)
    }

    /// Total messages that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Whether a send has failed on this connection.
    pub fn is_broken(&self) -> bool {
        self.broken.is_cancelled()
    }

    /// Resolves once a send has failed.
    pub async fn broken(&self) {
        self.broken.cancelled().await;
    }

    /// Record client activity (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Time since the last client activity.
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[async_trait]
impl Connection for ChannelConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send_text(&self, text: Arc<str>) -> Result<(), SendError> {
        let err = match self.tx.try_send(text) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => SendError::QueueFull,
            Err(mpsc::error::TrySendError::Closed(_)) => SendError::Closed,
        };
        let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        self.broken.cancel();
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection() -> (ChannelConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ChannelConnection::new(ConnectionId::from_raw("conn_1"), tx);
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.id().as_str(), "conn_1");
        assert!(conn.is_alive.load(Ordering::Relaxed));
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn channel_assigns_fresh_id() {
        let (a, _ra) = ChannelConnection::channel(4);
        let (b, _rb) = ChannelConnection::channel(4);
        assert_ne!(a.id(), b.id());
        assert!(a.id().as_str().starts_with("conn_"));
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection();
        conn.send_text(Arc::from("hello")).await.unwrap();
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_fails() {
        let (conn, rx) = make_connection();
        drop(rx);
        let err = conn.send_text(Arc::from("hello")).await.unwrap_err();
        assert_eq!(err, SendError::Closed);
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ChannelConnection::new(ConnectionId::new(), tx);
        conn.send_text(Arc::from("msg1")).await.unwrap();
        let err = conn.send_text(Arc::from("msg2")).await.unwrap_err();
        assert_eq!(err, SendError::QueueFull);
        assert_eq!(conn.drop_count(), 1);
        assert!(conn.is_broken());
    }

    #[tokio::test]
    async fn broken_resolves_after_failure() {
        let (conn, rx) = make_connection();
        assert!(!conn.is_broken());
        drop(rx);
        let _ = conn.send_text(Arc::from("x")).await;
        tokio::time::timeout(Duration::from_secs(1), conn.broken())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn shared_text_is_not_copied() {
        let (conn, mut rx) = make_connection();
        let text: Arc<str> = Arc::from("shared");
        conn.send_text(text.clone()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&text, &received));
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection();
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn mark_alive_resets_last_seen() {
        let (conn, _rx) = make_connection();
        std::thread::sleep(Duration::from_millis(10));
        let before = conn.last_seen_elapsed();
        conn.mark_alive();
        assert!(conn.last_seen_elapsed() < before);
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }
}
