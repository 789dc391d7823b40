//! Incoming WhatsApp message handling.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warelay_core::{message::InboundMessage, session::SessionEvent};

/// Bounded memory of recently seen message ids, oldest evicted first.
pub(super) struct RecentIds {
    order: VecDeque<String>,
    set: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `id`. Returns `false` if it was already present.
    pub(super) fn insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        true
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.order.len()
    }
}

/// Empty allow-list means everyone is allowed.
pub(super) fn is_allowed(allowed: &[String], phone: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a.trim_start_matches('+') == phone)
}

/// Pull the user-visible text out of a message, unwrapping nested wrappers
/// (device_sent, ephemeral, view_once). Media captions count as text.
pub(super) fn extract_text(msg: &waproto::whatsapp::Message) -> Option<String> {
    let inner = msg
        .device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg);

    inner
        .conversation
        .as_deref()
        .or_else(|| {
            inner
                .extended_text_message
                .as_ref()
                .and_then(|e| e.text.as_deref())
        })
        .or_else(|| {
            inner
                .image_message
                .as_ref()
                .and_then(|i| i.caption.as_deref())
        })
        .or_else(|| {
            inner
                .video_message
                .as_ref()
                .and_then(|v| v.caption.as_deref())
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Process an incoming WhatsApp message event.
///
/// Drops our own messages, redeliveries, senders outside the allow-list and
/// messages without text. Group messages are forwarded flagged; the gateway
/// discards them.
pub(super) async fn handle_whatsapp_message(
    msg: waproto::whatsapp::Message,
    info: wacore::types::message::MessageInfo,
    events: &mpsc::Sender<SessionEvent>,
    allowed: &[String],
    seen: &Arc<Mutex<RecentIds>>,
) {
    debug!(
        "WA msg: is_group={}, is_from_me={}, sender={}, chat={}",
        info.source.is_group, info.source.is_from_me, info.source.sender.user, info.source.chat.user,
    );

    if info.source.is_from_me {
        return;
    }

    if !seen.lock().await.insert(&info.id) {
        debug!("skipping redelivered message {}", info.id);
        return;
    }

    let phone = info.source.sender.user.clone();
    if !is_allowed(allowed, &phone) {
        warn!("ignoring whatsapp message from unauthorized {phone}");
        return;
    }

    let Some(text) = extract_text(&msg) else {
        debug!("WA filtered: no text content in {}", info.id);
        return;
    };

    let sender_name = if info.push_name.is_empty() {
        None
    } else {
        Some(info.push_name.clone())
    };

    let inbound = InboundMessage {
        id: Uuid::new_v4(),
        sender_id: info.source.chat.to_string(),
        sender_name,
        text,
        is_group: info.source.is_group,
        timestamp: info.timestamp,
    };

    if events.send(SessionEvent::MessageReceived(inbound)).await.is_err() {
        info!("whatsapp event receiver dropped");
    }
}
