//! Connection manager: the session state machine.
//!
//! Consumes [`SessionEvent`]s and decides what the gateway loop does next.
//! It owns the only mutable copy of the session; everyone else reads the
//! snapshots it publishes on a `watch` channel.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use warelay_core::{
    config::ReconnectConfig,
    message::InboundMessage,
    session::{CloseReason, ConnectionState, SessionEvent, SessionSnapshot},
};

/// Linear backoff: the n-th reconnect waits `base_delay × n`.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            base_delay: Duration::from_secs(config.base_delay_secs),
            max_attempts: config.max_attempts,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// What the gateway loop must do after an event.
#[derive(Debug)]
pub enum Directive {
    None,
    /// Hand the message to the relay.
    Relay(InboundMessage),
    /// Arm the (single) reconnect timer.
    Reconnect { attempt: u32, delay: Duration },
    /// The session recovered on its own; disarm the pending timer.
    CancelReconnect,
    /// Reconnect budget exhausted.
    Fatal { attempts: u32 },
}

#[derive(Debug, Default)]
struct Session {
    state: ConnectionState,
    pending_qr: Option<String>,
    attempts: u32,
    reconnect_pending: bool,
    /// Set by a logout; later closes from the same session are stale.
    logged_out: bool,
}

/// Owns the session lifecycle.
pub struct ConnectionManager {
    session: Session,
    policy: ReconnectPolicy,
    tx: watch::Sender<SessionSnapshot>,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot::default());
        Self {
            session: Session::default(),
            policy,
            tx,
        }
    }

    /// Receiver for read-only snapshots of the session.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    /// The reconnect timer fired and a new `connect()` is about to start.
    pub fn begin_attempt(&mut self) {
        self.session.reconnect_pending = false;
        debug!(
            "reconnect attempt {}/{} starting",
            self.session.attempts, self.policy.max_attempts
        );
    }

    /// Apply one event to the session.
    pub fn handle(&mut self, event: SessionEvent) -> Directive {
        match event {
            SessionEvent::QrChallenge(code) => {
                self.session.state = ConnectionState::AwaitingScan;
                self.session.pending_qr = Some(code);
                self.session.attempts = 0;
                self.session.logged_out = false;
                self.publish();
                self.cancel_pending()
            }
            SessionEvent::Opened => {
                info!("session connected");
                self.session.state = ConnectionState::Connected;
                self.session.pending_qr = None;
                self.session.attempts = 0;
                self.session.logged_out = false;
                self.publish();
                self.cancel_pending()
            }
            SessionEvent::Closed(reason) => self.on_closed(reason),
            SessionEvent::MessageReceived(msg) => {
                if msg.is_group {
                    debug!("dropping group message from {}", msg.sender_id);
                    Directive::None
                } else {
                    Directive::Relay(msg)
                }
            }
        }
    }

    fn on_closed(&mut self, reason: CloseReason) -> Directive {
        self.session.state = ConnectionState::Disconnected;
        self.session.pending_qr = None;
        self.publish();

        if !reason.is_retryable() {
            warn!("session closed ({reason}); not reconnecting, pair the device again");
            self.session.reconnect_pending = false;
            self.session.logged_out = true;
            return Directive::CancelReconnect;
        }

        if self.session.logged_out {
            debug!("session closed ({reason}) after logout; staying down");
            return Directive::None;
        }

        if self.session.reconnect_pending {
            debug!("session closed ({reason}) while a reconnect is already scheduled");
            return Directive::None;
        }

        if self.session.attempts >= self.policy.max_attempts {
            error!(
                "session closed ({reason}); giving up after {} reconnect attempts",
                self.session.attempts
            );
            return Directive::Fatal {
                attempts: self.session.attempts,
            };
        }

        self.session.attempts += 1;
        self.session.reconnect_pending = true;
        self.publish();

        let attempt = self.session.attempts;
        let delay = self.policy.delay_for(attempt);
        warn!(
            "session closed ({reason}); reconnect {attempt}/{} in {}s",
            self.policy.max_attempts,
            delay.as_secs_f32()
        );
        Directive::Reconnect { attempt, delay }
    }

    fn cancel_pending(&mut self) -> Directive {
        if std::mem::take(&mut self.session.reconnect_pending) {
            Directive::CancelReconnect
        } else {
            Directive::None
        }
    }

    fn publish(&self) {
        self.tx.send_replace(SessionSnapshot {
            state: self.session.state,
            pending_qr: self.session.pending_qr.clone(),
            reconnect_attempts: self.session.attempts,
            changed_at: Utc::now(),
        });
    }
}
