//! Outbound notifications
//!
//! The engine only sees the [`Notifier`] trait. Delivery (queueing, rate
//! limiting, retries, HTTP) lives behind [`NotificationService`] and never
//! reports back to the caller.

mod service;
mod telegram;

pub use service::{DeliveryStats, NotificationService, NotifierHandle, PendingQueue};
pub use telegram::{DeliverySink, TelegramClient};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Normal,
}

/// Fire-and-forget message sink
pub trait Notifier: Send + Sync {
    fn send(&self, text: &str, priority: Priority);
}

/// Delivery failures. Handled inside the notification worker only.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API rejected message ({status}): {description}")]
    Api { status: u16, description: String },

    #[error("forwarding channel closed")]
    ChannelClosed,
}

/// Convert `**bold**` to Telegram Markdown `*bold*`
pub fn to_telegram_markdown(text: &str) -> String {
    text.replace("**", "*")
}
