//! Typed push helpers for the rest of the backend.

use chatpush_core::{NewMessageEvent, RegistryError, ServerEvent};

use crate::registry::{ConnectionRegistry, DeliveryReport};

/// Push a `new_message` event to the event's account group and to every
/// global observer.
pub async fn notify_new_message(
    registry: &ConnectionRegistry,
    event: NewMessageEvent,
) -> Result<DeliveryReport, RegistryError> {
    let account = event.account_id.clone();
    registry
        .broadcast_to_group(&account, &ServerEvent::NewMessage(event))
        .await
}
