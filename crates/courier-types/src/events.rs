use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageRecord;
use crate::push::PushSubscription;

/// Events sent over the realtime gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// Connection is bound to the identity from the handshake
    #[serde(rename_all = "camelCase")]
    Ready { user_id: Uuid },

    /// A direct message addressed to the connected user
    Message(MessageRecord),
}

/// Commands sent FROM client TO server over the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayCommand {
    /// Opt in to push notifications while offline
    Subscribe(PushSubscription),
}
