//! Session lifecycle types shared between the channel, the gateway and the API.

use crate::error::RelayError;
use crate::message::InboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of the single messaging session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// A pairing code was issued and is waiting to be scanned.
    AwaitingScan,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingScan => "awaiting_scan",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport dropped; eligible for reconnect.
    ConnectionLost,
    /// The account unlinked this device. Terminal until re-paired.
    LoggedOut,
    /// `connect()` itself failed; treated like a lost connection.
    ConnectFailed(String),
}

impl CloseReason {
    /// Whether the connection manager may schedule a reconnect for this reason.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionLost => f.write_str("connection lost"),
            Self::LoggedOut => f.write_str("logged out"),
            Self::ConnectFailed(e) => write!(f, "connect failed: {e}"),
        }
    }
}

/// Tagged events emitted by a channel implementation.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new pairing code is available (raw payload, not rendered).
    QrChallenge(String),
    /// The session is authenticated and ready to send.
    Opened,
    Closed(CloseReason),
    MessageReceived(InboundMessage),
}

/// Read-only view of the session published by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub pending_qr: Option<String>,
    pub reconnect_attempts: u32,
    pub changed_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Sends are only allowed on a connected session.
    pub fn ensure_connected(&self) -> Result<(), RelayError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(RelayError::NotConnected)
        }
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            pending_qr: None,
            reconnect_attempts: 0,
            changed_at: Utc::now(),
        }
    }
}
