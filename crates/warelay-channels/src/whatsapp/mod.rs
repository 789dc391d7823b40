//! WhatsApp channel: pure Rust implementation via `whatsapp-rust`.
//!
//! Uses the WhatsApp Web protocol (Noise handshake + Signal encryption).
//! Pairing is done by scanning a QR code, like WhatsApp Web.
//! Session is persisted to `{data_dir}/whatsapp_session/whatsapp.db` by the
//! library's sqlite storage.

mod bot;
mod channel;
mod events;


use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use warelay_core::config::WhatsAppConfig;

use events::RecentIds;

/// Server suffix of personal WhatsApp addresses.
pub const USER_SUFFIX: &str = "@s.whatsapp.net";

/// File name of the session database inside the session directory.
const SESSION_DB: &str = "whatsapp.db";

/// How many inbound message ids are remembered for redelivery detection.
const SEEN_CAPACITY: usize = 512;

/// WhatsApp channel using the WhatsApp Web protocol.
pub struct WhatsAppChannel {
    pub(super) config: WhatsAppConfig,
    pub(super) session_dir: PathBuf,
    /// Client handle for sending messages, replaced on every `connect()`.
    pub(super) client: Arc<Mutex<Option<Arc<whatsapp_rust::client::Client>>>>,
    /// Background task running the current bot.
    pub(super) bot_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every `connect()`; events from older bots are dropped.
    pub(super) generation: Arc<AtomicU64>,
    /// Recently seen inbound message ids.
    pub(super) seen: Arc<Mutex<RecentIds>>,
}

impl WhatsAppChannel {
    /// Create a new WhatsApp channel storing its session under `session_dir`.
    pub fn new(config: WhatsAppConfig, session_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            session_dir: session_dir.into(),
            client: Arc::new(Mutex::new(None)),
            bot_task: Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
            seen: Arc::new(Mutex::new(RecentIds::new(SEEN_CAPACITY))),
        }
    }

    /// Get the session database path, creating the directory if needed.
    pub(super) fn session_db_path(&self) -> Result<String, std::io::Error> {
        std::fs::create_dir_all(&self.session_dir)?;
        Ok(self.session_dir.join(SESSION_DB).to_string_lossy().into_owned())
    }
}

/// Whether a previously paired session exists in `session_dir`.
pub fn session_exists(session_dir: &Path) -> bool {
    session_dir.join(SESSION_DB).exists()
}
