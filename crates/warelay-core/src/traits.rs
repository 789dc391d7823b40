use crate::{
    error::RelayError,
    message::{self, WebhookReply},
    session::SessionEvent,
};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Messaging channel: the transport.
///
/// A channel owns the underlying client library. It reports lifecycle changes
/// and inbound messages as [`SessionEvent`]s and exposes the one send primitive
/// shared by the relay and the outbound API.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Server suffix appended to bare recipient ids (e.g. `@s.whatsapp.net`).
    fn address_suffix(&self) -> &str;

    /// Turn a bare recipient id into a full transport address.
    fn qualify(&self, recipient: &str) -> String {
        message::qualify(recipient, self.address_suffix())
    }

    /// Strip transport-specific decoration from an address.
    fn local_id(&self, address: &str) -> String {
        message::local_part(address).to_string()
    }

    /// Start (or restart) the session, forwarding events into `events`.
    ///
    /// Returns once the client library has accepted the session; this does
    /// not wait for authentication. Any previous client is torn down first.
    async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), RelayError>;

    /// Send a text message to a full transport address.
    ///
    /// Implementations must resolve the live client at call time.
    async fn send_text(&self, address: &str, text: &str) -> Result<(), RelayError>;

    /// Drop the current client, if any.
    async fn disconnect(&self) -> Result<(), RelayError>;
}

/// The webhook collaborator that turns inbound text into a reply.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Human-readable responder name.
    fn name(&self) -> &str;

    /// Ask for a reply to `text` sent by `from` (a bare sender id).
    ///
    /// Transport failures and non-success statuses are errors; a response
    /// with an unexpected shape is `Ok(WebhookReply::Malformed)`.
    async fn respond(&self, from: &str, text: &str) -> Result<WebhookReply, RelayError>;
}
