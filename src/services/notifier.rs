//! Side-channel notifications (Telegram)

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{
    config::TelegramConfig,
    error::{AppError, AppResult},
};

/// Best-effort text delivery. Implementations log and swallow their failures.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str);
}

/// Deliver `text` on a detached task so callers never wait on the channel.
pub fn spawn_notification(notifier: Arc<dyn Notifier>, text: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        notifier.send(&text).await;
    })
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API notifier
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Fails when the bot token or chat id is missing.
    pub fn new(config: &TelegramConfig) -> AppResult<Self> {
        let (token, chat_id) = config.credentials()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                token
            ),
            chat_id: chat_id.to_string(),
        })
    }

    async fn post_message(&self, text: &str) -> AppResult<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Telegram request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Telegram rejected message ({}): {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) {
        match self.post_message(text).await {
            Ok(()) => tracing::debug!(chat_id = %self.chat_id, "Telegram message sent"),
            Err(e) => tracing::warn!(chat_id = %self.chat_id, "Error sending message to Telegram: {}", e),
        }
    }
}
