//! Test doubles shared by the gateway and API tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use warelay_core::{
    error::RelayError,
    message::WebhookReply,
    session::{ConnectionState, SessionEvent, SessionSnapshot},
    traits::{Channel, Responder},
};

#[derive(Debug, Clone, Copy, Default)]
pub enum SendBehavior {
    #[default]
    Succeed,
    Fail,
    Hang(Duration),
}

/// Channel that records sends and can script its connect outcome.
#[derive(Default)]
pub struct MockChannel {
    sent: Mutex<Vec<(String, String)>>,
    send_attempts: AtomicUsize,
    send: SendBehavior,
    connect_calls: AtomicUsize,
    fail_connect: bool,
    on_connect: Vec<SessionEvent>,
    events: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

impl MockChannel {
    pub fn failing_sends() -> Self {
        Self {
            send: SendBehavior::Fail,
            ..Default::default()
        }
    }

    pub fn hanging_sends(delay: Duration) -> Self {
        Self {
            send: SendBehavior::Hang(delay),
            ..Default::default()
        }
    }

    pub fn failing_connects() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    /// Emit `events` every time `connect` succeeds.
    pub fn emitting(events: Vec<SessionEvent>) -> Self {
        Self {
            on_connect: events,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// The event sender handed over by the last successful `connect`.
    pub fn events(&self) -> Option<mpsc::Sender<SessionEvent>> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        "mock"
    }

    fn address_suffix(&self) -> &str {
        "@s.whatsapp.net"
    }

    async fn connect(&self, events: mpsc::Sender<SessionEvent>) -> Result<(), RelayError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(RelayError::Channel("connection refused".into()));
        }
        for event in &self.on_connect {
            let _ = events.send(event.clone()).await;
        }
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    async fn send_text(&self, address: &str, text: &str) -> Result<(), RelayError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        match self.send {
            SendBehavior::Succeed => {}
            SendBehavior::Fail => return Err(RelayError::Channel("send rejected".into())),
            SendBehavior::Hang(delay) => tokio::time::sleep(delay).await,
        }
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), text.to_string()));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), RelayError> {
        *self.events.lock().unwrap() = None;
        Ok(())
    }
}

/// Responder that answers every call with the same scripted reply.
pub struct MockResponder {
    reply: Result<WebhookReply, String>,
    timeout: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockResponder {
    pub fn replying(reply: Result<WebhookReply, RelayError>) -> Self {
        let timeout = matches!(reply, Err(RelayError::Timeout(_)));
        Self {
            reply: reply.map_err(|e| e.to_string()),
            timeout,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Responder for MockResponder {
    fn name(&self) -> &str {
        "mock-webhook"
    }

    async fn respond(&self, from: &str, text: &str) -> Result<WebhookReply, RelayError> {
        self.calls
            .lock()
            .unwrap()
            .push((from.to_string(), text.to_string()));
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(e) if self.timeout => Err(RelayError::Timeout(e.clone())),
            Err(e) => Err(RelayError::Webhook(e.clone())),
        }
    }
}

fn session_in(state: ConnectionState) -> (watch::Sender<SessionSnapshot>, watch::Receiver<SessionSnapshot>) {
    watch::channel(SessionSnapshot {
        state,
        ..Default::default()
    })
}

pub fn connected() -> (watch::Sender<SessionSnapshot>, watch::Receiver<SessionSnapshot>) {
    session_in(ConnectionState::Connected)
}

pub fn disconnected() -> (watch::Sender<SessionSnapshot>, watch::Receiver<SessionSnapshot>) {
    session_in(ConnectionState::Disconnected)
}

pub fn awaiting_scan(qr: &str) -> (watch::Sender<SessionSnapshot>, watch::Receiver<SessionSnapshot>) {
    watch::channel(SessionSnapshot {
        state: ConnectionState::AwaitingScan,
        pending_qr: Some(qr.to_string()),
        ..Default::default()
    })
}
