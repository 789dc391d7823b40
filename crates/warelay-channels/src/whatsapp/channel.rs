//! Channel trait implementation for WhatsApp.

use super::{WhatsAppChannel, USER_SUFFIX};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};
use wacore_binary::jid::Jid;
use warelay_core::{error::RelayError, session::SessionEvent, traits::Channel};

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    fn address_suffix(&self) -> &str {
        USER_SUFFIX
    }

    async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), RelayError> {
        self.build_and_run_bot(events).await
    }

    /// Send a text message to a JID string (phone@s.whatsapp.net).
    async fn send_text(&self, address: &str, text: &str) -> Result<(), RelayError> {
        // Resolve the live client now; a reconnect may have replaced it.
        let client = self
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(|| RelayError::Channel("whatsapp client not connected".into()))?;

        let jid: Jid = address
            .parse()
            .map_err(|e| RelayError::Channel(format!("invalid whatsapp JID '{address}': {e}")))?;

        let msg = waproto::whatsapp::Message {
            conversation: Some(text.to_string()),
            ..Default::default()
        };

        let msg_id = client
            .send_message(jid, msg)
            .await
            .map_err(|e| RelayError::Channel(format!("whatsapp send failed: {e}")))?;
        debug!("whatsapp message {msg_id} sent to {address}");

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RelayError> {
        self.teardown().await;
        info!("WhatsApp channel stopped");
        Ok(())
    }
}
