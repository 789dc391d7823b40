//! Message relay: inbound text -> webhook -> reply back to the sender.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use warelay_core::{
    error::RelayError,
    message::{InboundMessage, WebhookReply},
    session::SessionSnapshot,
    traits::{Channel, Responder},
};

/// How a single inbound message was settled. Logged, and asserted on in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Group chats are never forwarded.
    IgnoredGroup,
    /// The webhook's reply was delivered.
    Replied,
    /// The webhook answered with an unusable body; the apology was delivered.
    Fallback,
    /// The webhook chose not to reply.
    NoReply,
    /// The webhook call itself failed. The sender gets nothing.
    WebhookFailed,
    /// A reply was due but could not be delivered.
    DeliveryFailed,
}

pub struct Relay {
    channel: Arc<dyn Channel>,
    responder: Arc<dyn Responder>,
    session: watch::Receiver<SessionSnapshot>,
    fallback_message: String,
    send_timeout: Duration,
}

impl Relay {
    pub fn new(
        channel: Arc<dyn Channel>,
        responder: Arc<dyn Responder>,
        session: watch::Receiver<SessionSnapshot>,
        fallback_message: String,
        send_timeout: Duration,
    ) -> Self {
        Self {
            channel,
            responder,
            session,
            fallback_message,
            send_timeout,
        }
    }

    /// Forward one message to the webhook and deliver whatever it says.
    pub async fn handle(&self, msg: InboundMessage) -> RelayOutcome {
        if msg.is_group {
            debug!("relay: skipping group message from {}", msg.sender_id);
            return RelayOutcome::IgnoredGroup;
        }

        let from = self.channel.local_id(&msg.sender_id);
        let id = msg.id;
        info!(
            "[{from}] inbound message {id} from {} -> {}",
            msg.sender_name.as_deref().unwrap_or("unknown"),
            self.responder.name()
        );
        let queued_ms = (Utc::now() - msg.timestamp).num_milliseconds();
        debug!("[{from}] {id} sent {queued_ms}ms ago: {}", preview(&msg.text));

        let reply = match self.responder.respond(&from, &msg.text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[{from}] {id} webhook call failed: {e}");
                return RelayOutcome::WebhookFailed;
            }
        };

        let delivered = match reply {
            WebhookReply::Empty => {
                debug!("[{from}] {id} webhook returned no reply");
                return RelayOutcome::NoReply;
            }
            WebhookReply::Text(text) => self
                .deliver(&msg.sender_id, &text)
                .await
                .map(|()| RelayOutcome::Replied),
            WebhookReply::Malformed(why) => {
                warn!("[{from}] {id} unexpected webhook response: {why}");
                self.deliver(&msg.sender_id, &self.fallback_message)
                    .await
                    .map(|()| RelayOutcome::Fallback)
            }
        };

        match delivered {
            Ok(outcome) => {
                info!("[{from}] {id} reply sent");
                outcome
            }
            Err(e) => {
                warn!("[{from}] {id} reply not delivered: {e}");
                RelayOutcome::DeliveryFailed
            }
        }
    }

    async fn deliver(&self, address: &str, text: &str) -> Result<(), RelayError> {
        // The session may have dropped while the webhook was thinking.
        self.session.borrow().ensure_connected()?;

        match tokio::time::timeout(self.send_timeout, self.channel.send_text(address, text)).await
        {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(format!(
                "send did not finish within {}s",
                self.send_timeout.as_secs_f32()
            ))),
        }
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 60;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
