use thiserror::Error;

/// Top-level error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Error from the messaging channel (connect, send, address parsing).
    #[error("channel error: {0}")]
    Channel(String),

    /// Error talking to the webhook collaborator.
    #[error("webhook error: {0}")]
    Webhook(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// A send was requested while the session is not connected.
    #[error("session is not connected")]
    NotConnected,

    /// An awaited operation did not finish in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The reconnect budget ran out; the process should exit.
    #[error("reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
