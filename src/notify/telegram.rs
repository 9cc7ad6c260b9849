//! Telegram bot notifier
//!
//! API Documentation: https://core.telegram.org/bots/api#sendmessage

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::Notifier;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};

/// Telegram Bot API base URL
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Maximum characters per Telegram message
pub const MAX_MESSAGE_CHARS: usize = 4096;

#[derive(Debug, Clone, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends notifications to a Telegram chat
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            api_url: TELEGRAM_API_URL.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Use a different Bot API endpoint
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Build from config; `None` when Telegram is not configured
    pub fn from_config(config: &TelegramConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        match (&config.token, &config.chat_id) {
            (Some(token), Some(chat_id)) => Some(Self::new(token.clone(), chat_id.clone())),
            _ => None,
        }
    }

    async fn send_chunk(&self, text: &str) -> Result<()> {
        // The URL carries the bot token; errors must not include it
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.token);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::Notification(format!("HTTP request failed: {}", e.without_url()))
            })?;

        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| {
                Error::Notification(format!("Failed to parse response: {}", e.without_url()))
            })?;

        if !body.ok {
            return Err(Error::Notification(
                body.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) {
        for chunk in split_message(message, MAX_MESSAGE_CHARS) {
            if let Err(e) = self.send_chunk(&chunk).await {
                warn!("Telegram notification failed: {}", e);
                return;
            }
        }
        debug!("Telegram notification sent ({} chars)", message.chars().count());
    }
}

/// Split `text` into ordered chunks of at most `max_chars` characters
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
