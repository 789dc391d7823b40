//! Building, running and tearing down the WhatsApp bot.

use super::events::handle_whatsapp_message;
use super::WhatsAppChannel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wacore::types::events::Event;
use warelay_core::{
    error::RelayError,
    session::{CloseReason, SessionEvent},
};
use whatsapp_rust::bot::Bot;
use whatsapp_rust_sqlite_storage::SqliteStore;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

impl WhatsAppChannel {
    /// Close the current client's socket, stop its run loop and forget it.
    pub(super) async fn teardown(&self) {
        // Invalidate the old bot's event handler and watcher before stopping it.
        self.generation.fetch_add(1, Ordering::SeqCst);

        let old = self.client.lock().await.take();
        if let Some(client) = old {
            client.disconnect().await;
            debug!("previous WhatsApp client disconnected");
        }
        if let Some(task) = self.bot_task.lock().await.take() {
            task.abort();
            debug!("previous WhatsApp bot task aborted");
        }
    }

    /// Build a WhatsApp bot with the event handler and run it in the background.
    ///
    /// Lifecycle events and inbound messages are translated into
    /// [`SessionEvent`]s and pushed into `events`.
    pub(super) async fn build_and_run_bot(
        &self,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<(), RelayError> {
        self.teardown().await;
        let generation = self.generation.load(Ordering::SeqCst);

        let db_path = self.session_db_path()?;

        info!("WhatsApp bot building (session: {db_path})...");

        let backend = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .map_err(|e| RelayError::Channel(format!("whatsapp store init failed: {e}")))?,
        );

        let allowed_users = self.config.allowed_users.clone();
        let watcher_events = events.clone();
        let generation_handle = self.generation.clone();
        let seen_handle = self.seen.clone();

        let mut bot = Bot::builder()
            .with_backend(backend)
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.config.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, _client| {
                let events = events.clone();
                let allowed = allowed_users.clone();
                let current = generation_handle.clone();
                let seen = seen_handle.clone();
                async move {
                    if current.load(Ordering::SeqCst) != generation {
                        debug!("dropping event from a replaced WhatsApp bot");
                        return;
                    }

                    let forward = match event {
                        Event::PairingQrCode { code, .. } => {
                            info!("WhatsApp QR code generated (scan to pair)");
                            debug!("QR data: {code}");
                            Some(SessionEvent::QrChallenge(code))
                        }
                        Event::PairSuccess(_) => {
                            info!("WhatsApp pairing successful!");
                            None
                        }
                        Event::Connected(_) => {
                            info!("WhatsApp connected");
                            Some(SessionEvent::Opened)
                        }
                        Event::Disconnected(_) => {
                            warn!("WhatsApp disconnected");
                            Some(SessionEvent::Closed(CloseReason::ConnectionLost))
                        }
                        Event::LoggedOut(_) => {
                            warn!("WhatsApp logged out, session invalidated");
                            Some(SessionEvent::Closed(CloseReason::LoggedOut))
                        }
                        Event::StreamReplaced(_) => {
                            warn!("WhatsApp session replaced by another client");
                            Some(SessionEvent::Closed(CloseReason::LoggedOut))
                        }
                        Event::StreamError(e) => {
                            warn!("WhatsApp stream error: {e:?}");
                            None
                        }
                        Event::Message(msg, info) => {
                            handle_whatsapp_message(*msg, info, &events, &allowed, &seen).await;
                            None
                        }
                        _ => None,
                    };

                    if let Some(ev) = forward {
                        if events.send(ev).await.is_err() {
                            info!("whatsapp event receiver dropped");
                        }
                    }
                }
            })
            .build()
            .await
            .map_err(|e| RelayError::Channel(format!("whatsapp bot build failed: {e}")))?;

        // Reconnects are scheduled by the gateway; the library loop makes one attempt.
        let client = bot.client();
        client.enable_auto_reconnect.store(false, Ordering::SeqCst);
        // Store client reference immediately; sends stay gated on the session state.
        *self.client.lock().await = Some(client);

        // Run bot in background.
        let handle = bot
            .run()
            .await
            .map_err(|e| RelayError::Channel(format!("whatsapp bot run failed: {e}")))?;
        let watcher = watch_run_loop(
            handle,
            watcher_events,
            self.generation.clone(),
            generation,
        );
        *self.bot_task.lock().await = Some(watcher);

        info!("WhatsApp bot started");
        Ok(())
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Wait for the library's run loop to end and report it as a lost connection.
///
/// The report is skipped when the bot was replaced in the meantime. Aborting
/// the returned task also aborts the run loop.
pub(super) fn watch_run_loop(
    run: JoinHandle<()>,
    events: mpsc::Sender<SessionEvent>,
    generation: Arc<AtomicU64>,
    expected: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut run = AbortOnDrop(run);
        if let Err(e) = (&mut run.0).await {
            if e.is_panic() {
                warn!("WhatsApp run loop panicked");
            }
        }

        if generation.load(Ordering::SeqCst) != expected {
            debug!("replaced WhatsApp bot stopped");
            return;
        }

        warn!("WhatsApp run loop ended");
        if events
            .send(SessionEvent::Closed(CloseReason::ConnectionLost))
            .await
            .is_err()
        {
            info!("whatsapp event receiver dropped");
        }
    })
}
