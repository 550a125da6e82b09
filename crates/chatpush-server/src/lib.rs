//! # chatpush-server
//!
//! Axum HTTP + `WebSocket` gateway for real-time chat notifications.
//!
//! - [`registry::ConnectionRegistry`]: connections grouped by account id plus a
//!   global observer set, with best-effort fan-out and self-healing cleanup
//! - [`connection`]: the `Connection` seam and its channel-backed implementation
//! - [`session`]: per-socket reader/writer/heartbeat loop
//! - [`server::ChatServer`]: router, listener, graceful shutdown

#![deny(unsafe_code)]

pub mod connection;
pub mod health;
pub mod heartbeat;
pub mod notify;
pub mod registry;
pub mod server;
pub mod session;
pub mod shutdown;

pub use connection::{ChannelConnection, Connection};
pub use notify::notify_new_message;
pub use registry::{AccountStats, ConnectionRegistry, DeliveryReport, RegistryStats};
pub use server::{AppState, ChatServer, ServerHandle};
