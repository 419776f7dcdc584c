//! Delivery sinks
//!
//! Telegram Bot API client plus the log and in-process channel sinks.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

use super::{to_telegram_markdown, NotifyError};
use crate::config::{NotifierConfig, TelegramConfig};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Minimal Bot API client: `sendMessage` only
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http_client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotifyError> {
        Self::with_base_url(config, TELEGRAM_API_BASE)
    }

    pub fn with_base_url(
        config: &TelegramConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }

    pub async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": to_telegram_markdown(text),
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        let response = self.http_client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let parsed: Option<TelegramResponse> = serde_json::from_str(&text).ok();
        match parsed {
            Some(TelegramResponse { ok: true, .. }) if status.is_success() => Ok(()),
            Some(TelegramResponse { description, .. }) => Err(NotifyError::Api {
                status: status.as_u16(),
                description: description.unwrap_or(text),
            }),
            None => Err(NotifyError::Api {
                status: status.as_u16(),
                description: text,
            }),
        }
    }
}

/// Where the worker delivers rendered messages
#[derive(Debug, Clone)]
pub enum DeliverySink {
    /// Write through `tracing` at info level
    Log,
    Telegram(TelegramClient),
    /// Forward to an in-process consumer
    Channel(mpsc::UnboundedSender<String>),
}

impl DeliverySink {
    /// Telegram when credentials are configured, otherwise the log
    pub fn from_config(config: &NotifierConfig) -> Result<Self, NotifyError> {
        match &config.telegram {
            Some(telegram) => Ok(DeliverySink::Telegram(TelegramClient::new(telegram)?)),
            None => Ok(DeliverySink::Log),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeliverySink::Log => "log",
            DeliverySink::Telegram(_) => "telegram",
            DeliverySink::Channel(_) => "channel",
        }
    }

    pub async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        match self {
            DeliverySink::Log => {
                info!("[notify] {}", to_telegram_markdown(text));
                Ok(())
            }
            DeliverySink::Telegram(client) => client.send_message(text).await,
            DeliverySink::Channel(tx) => tx
                .send(text.to_string())
                .map_err(|_| NotifyError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_selection() {
        let mut config = NotifierConfig::default();
        assert_eq!(DeliverySink::from_config(&config).unwrap().name(), "log");

        config.telegram = Some(TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        });
        assert_eq!(DeliverySink::from_config(&config).unwrap().name(), "telegram");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_raw_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = DeliverySink::Channel(tx);
        sink.deliver("**hello**").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "**hello**");

        drop(rx);
        assert!(matches!(
            sink.deliver("x").await,
            Err(NotifyError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let config = TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        };
        // Port 9 on loopback refuses connections
        let client = TelegramClient::with_base_url(&config, "http://127.0.0.1:9").unwrap();
        assert!(matches!(
            client.send_message("hi").await,
            Err(NotifyError::Http(_))
        ));
    }
}
