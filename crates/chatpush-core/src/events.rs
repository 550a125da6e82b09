//! Frames exchanged with browser clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AccountId;

/// Events pushed from the server to connected clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A buyer message arrived for an account.
    NewMessage(NewMessageEvent),
    /// Reply to a client `ping`.
    Pong,
}

/// Payload of a `new_message` event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewMessageEvent {
    /// Account the message belongs to.
    #[serde(rename = "cookie_id")]
    pub account_id: AccountId,
    /// Conversation id.
    pub chat_id: String,
    /// Sender id.
    pub buyer_id: String,
    /// Sender display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    /// Sender avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_avatar: Option<String>,
    /// Message body.
    pub message: String,
    /// `text`, `image`, `card` or `order`.
    pub message_type: String,
    /// Listing the conversation is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// When the message was received.
    pub timestamp: DateTime<Utc>,
}

impl NewMessageEvent {
    /// A plain text message stamped with the current time.
    pub fn text(
        account_id: impl Into<AccountId>,
        chat_id: impl Into<String>,
        buyer_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            chat_id: chat_id.into(),
            buyer_id: buyer_id.into(),
            buyer_name: None,
            buyer_avatar: None,
            message: message.into(),
            message_type: "text".into(),
            item_id: None,
            timestamp: Utc::now(),
        }
    }
}

/// Frames sent by clients. Only `ping` has meaning; anything else is ignored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Application-level keepalive; answered with [`ServerEvent::Pong`].
    Ping,
    /// Any other frame type.
    #[serde(other)]
    Unknown,
}

impl ClientFrame {
    /// Parse an inbound text frame. Returns `None` for non-JSON or untagged input.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}
