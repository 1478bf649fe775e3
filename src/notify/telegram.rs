//! Telegram Bot API sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use super::MessageSink;
use crate::config::{AlertConfig, TlsConfig};
use crate::{LiveDataError, Result};

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages through `sendMessage` with HTML parse mode.
pub struct TelegramSink {
    api_url: String,
    bot_token: Zeroizing<String>,
    http: reqwest::Client,
}

impl TelegramSink {
    /// # Errors
    ///
    /// Returns [`LiveDataError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &AlertConfig, tls: &TlsConfig) -> Result<Self> {
        let http = crate::tls::build_http_client(tls, config.timeout)?;
        Ok(Self::with_client(config, http))
    }

    #[must_use]
    pub fn with_client(config: &AlertConfig, http: reqwest::Client) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            http,
        }
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        // The URL embeds the bot token; never log it.
        let url = format!("{}/bot{}/sendMessage", self.api_url, self.bot_token.as_str());
        let response = self
            .http
            .post(&url)
            .json(&SendMessage {
                chat_id: destination,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await
            .map_err(|e| LiveDataError::transport(format!("telegram request failed: {}", e.without_url())))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            LiveDataError::transport(format!("telegram response body unreadable: {}", e.without_url()))
        })?;
        if !status.is_success() {
            return Err(LiveDataError::Transport {
                status: Some(status.as_u16()),
                message: format!("telegram returned {status}"),
                body: Some(body),
            });
        }

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(ApiResponse { ok: true, .. }) => {
                debug!(chat_id = destination, "Telegram accepted message");
                Ok(())
            }
            Ok(ApiResponse { description, .. }) => Err(LiveDataError::transport(format!(
                "telegram rejected message: {}",
                description.as_deref().unwrap_or("no description")
            ))),
            Err(e) => Err(LiveDataError::transport(format!(
                "telegram response is not JSON: {e}"
            ))),
        }
    }
}
