//! # chatpush-core
//!
//! Shared vocabulary for the notification server:
//!
//! - [`ids`]: connection and account identifiers, membership [`Scope`]
//! - [`events`]: outbound server events and inbound client frames
//! - [`wire`]: the JSON text encoding used for every outbound frame
//! - [`errors`]: send and registry error types

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod wire;

pub use errors::{RegistryError, SendError};
pub use events::{ClientFrame, NewMessageEvent, ServerEvent};
pub use ids::{AccountId, ConnectionId, Scope};
pub use wire::to_wire_string;
