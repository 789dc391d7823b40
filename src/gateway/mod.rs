//! Gateway: the main event loop connecting the WhatsApp session, the
//! webhook relay and the outbound API.
//!
//! Session events are fed through the [`ConnectionManager`]; the loop carries
//! out its directives (relay, reconnect, give up) and owns the single
//! reconnect timer.

mod lifecycle;
mod relay;


use lifecycle::{ConnectionManager, Directive, ReconnectPolicy};
use relay::Relay;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{error, info, warn};
use warelay_core::{
    config::{ApiConfig, Config},
    error::RelayError,
    session::{CloseReason, SessionEvent},
    traits::{Channel, Responder},
};

/// Bound on session events queued between the channel and the loop.
const EVENT_BUFFER: usize = 256;

pub struct Gateway {
    /// Instance name from `relay.name`, used in logs.
    name: String,
    channel: Arc<dyn Channel>,
    responder_name: String,
    relay: Arc<Relay>,
    manager: ConnectionManager,
    api_config: ApiConfig,
    /// Armed while a reconnect is scheduled. Never more than one.
    reconnect: Option<Pin<Box<Sleep>>>,
}

impl Gateway {
    pub fn new(channel: Arc<dyn Channel>, responder: Arc<dyn Responder>, config: &Config) -> Self {
        let manager = ConnectionManager::new(ReconnectPolicy::from_config(&config.reconnect));
        let relay = Arc::new(Relay::new(
            channel.clone(),
            responder.clone(),
            manager.subscribe(),
            config.webhook.fallback_message.clone(),
            config.api.send_timeout(),
        ));
        Self {
            name: config.relay.name.clone(),
            channel,
            responder_name: responder.name().to_string(),
            relay,
            manager,
            api_config: config.api.clone(),
            reconnect: None,
        }
    }

    /// Run until `shutdown` resolves or the reconnect budget runs out.
    pub async fn run<F>(mut self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()>,
    {
        info!(
            "{} gateway running | channel: {} | webhook: {} | api: {}",
            self.name,
            self.channel.name(),
            self.responder_name,
            if self.api_config.enabled {
                format!("{}:{}", self.api_config.host, self.api_config.port)
            } else {
                "disabled".to_string()
            },
        );

        let (events_tx, mut events_rx) = mpsc::channel::<SessionEvent>(EVENT_BUFFER);

        // Spawn HTTP API server.
        let api_handle = if self.api_config.enabled {
            let state = crate::api::ApiState::new(
                self.channel.clone(),
                self.manager.subscribe(),
                &self.api_config,
            );
            let api_cfg = self.api_config.clone();
            Some(tokio::spawn(async move {
                crate::api::serve(api_cfg, state).await;
            }))
        } else {
            None
        };

        tokio::pin!(shutdown);

        let result = match self.connect(&events_tx).await {
            Err(e) => Err(e),
            Ok(()) => loop {
                tokio::select! {
                    Some(event) = events_rx.recv() => {
                        if let Err(e) = self.dispatch(event) {
                            break Err(e);
                        }
                    }
                    _ = fired(&mut self.reconnect) => {
                        self.reconnect = None;
                        self.manager.begin_attempt();
                        if let Err(e) = self.connect(&events_tx).await {
                            break Err(e);
                        }
                    }
                    _ = &mut shutdown => {
                        info!("Received shutdown signal");
                        break Ok(());
                    }
                }
            },
        };

        self.shutdown(&api_handle).await;
        result
    }

    /// Start a session. A failed start counts as a close.
    async fn connect(&mut self, events_tx: &mpsc::Sender<SessionEvent>) -> Result<(), RelayError> {
        match self.channel.connect(events_tx.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("{} connect failed: {e}", self.channel.name());
                self.dispatch(SessionEvent::Closed(CloseReason::ConnectFailed(
                    e.to_string(),
                )))
            }
        }
    }

    /// Feed one event to the connection manager and carry out its directive.
    fn dispatch(&mut self, event: SessionEvent) -> Result<(), RelayError> {
        match self.manager.handle(event) {
            Directive::None => {}
            Directive::Relay(msg) => {
                let relay = self.relay.clone();
                tokio::spawn(async move {
                    relay.handle(msg).await;
                });
            }
            Directive::Reconnect { delay, .. } => {
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Directive::CancelReconnect => {
                self.reconnect = None;
            }
            Directive::Fatal { attempts } => {
                error!("giving up on the {} session", self.channel.name());
                return Err(RelayError::ReconnectExhausted { attempts });
            }
        }
        Ok(())
    }

    /// Graceful shutdown: stop the API and drop the session.
    async fn shutdown(&mut self, api_handle: &Option<JoinHandle<()>>) {
        info!(
            "Shutting down {} (session {})...",
            self.name,
            self.manager.snapshot().state
        );

        self.reconnect = None;
        if let Some(h) = api_handle {
            h.abort();
        }

        if let Err(e) = self.channel.disconnect().await {
            warn!("failed to stop channel {}: {e}", self.channel.name());
        }

        info!("Shutdown complete.");
    }
}

/// Resolves when the armed timer fires; pending forever when none is armed.
async fn fired(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
