use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// An inbound message delivered by the channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Local correlation id, attached to every log line about this message.
    pub id: Uuid,
    /// Full transport address of the originating chat (e.g. `5511999887766@s.whatsapp.net`).
    /// Replies are sent back to this address.
    pub sender_id: String,
    /// Display name, when the transport provides one.
    pub sender_name: Option<String>,
    /// Message text content.
    pub text: String,
    /// Whether this message comes from a group chat.
    pub is_group: bool,
    /// When the sender sent it.
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a direct (non-group) message stamped with the current time.
    pub fn direct(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            sender_name: None,
            text: text.into(),
            is_group: false,
            timestamp: Utc::now(),
        }
    }
}

/// Payload accepted by `POST /send-message`.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboundRequest {
    /// Recipient: a bare id (`5511999887766`) or a full address.
    pub to: String,
    /// Text to deliver.
    pub message: String,
}

/// Outcome of a successful webhook exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookReply {
    /// The webhook produced reply text for the sender.
    Text(String),
    /// The webhook answered but chose not to reply (empty `message`).
    Empty,
    /// The response body did not have the expected shape.
    Malformed(String),
}

/// Strip the transport suffix (`@server`) and any device part (`:N`) from an address.
///
/// `5511999887766:12@s.whatsapp.net` -> `5511999887766`.
pub fn local_part(address: &str) -> &str {
    let user = address.split_once('@').map_or(address, |(user, _)| user);
    user.split_once(':').map_or(user, |(user, _)| user)
}

/// Append `suffix` to a bare recipient id. Addresses that already carry a
/// server part are returned unchanged.
pub fn qualify(recipient: &str, suffix: &str) -> String {
    let recipient = recipient.trim();
    if recipient.contains('@') {
        return recipient.to_string();
    }
    let digits = recipient.trim_start_matches('+');
    format!("{digits}{suffix}")
}
