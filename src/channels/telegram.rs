//! Telegram Bot API client.
//!
//! Delivers replies and typing indicators via the Bot API. Responses use the
//! standard `{ok, result, description}` envelope; `ok=false` surfaces the
//! `description` field as the error.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;

pub const TELEGRAM_DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";

/// Outbound request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from Telegram Bot API calls.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("telegram request failed: {0}")]
    Http(String),
    #[error("telegram api error: {0}")]
    Api(String),
}

/// Client for the Telegram Bot API.
pub struct TelegramApi {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl TelegramApi {
    /// Create a client targeting the given Bot API base URL.
    pub fn new(base_url: String, bot_token: String) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::Http(format!("client init failed: {e}")))?;
        Ok(Self {
            client,
            base_url,
            bot_token,
        })
    }

    /// Build the API endpoint URL for a method.
    fn api_url(&self, method: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/bot{}/{}", base, self.bot_token, method)
    }

    /// Send a text message to a chat.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.call("sendMessage", &body).await.map(|_| ())
    }

    /// Show the "typing..." indicator in a chat. Telegram clears it after a
    /// few seconds or when the next message arrives.
    pub async fn send_chat_action(&self, chat_id: i64) -> Result<(), ChannelError> {
        let body = json!({
            "chat_id": chat_id,
            "action": "typing",
        });
        self.call("sendChatAction", &body).await.map(|_| ())
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(format!("{method} request failed: {e}")))?;
        parse_envelope(resp).await
    }
}

/// Unwrap a Bot API response envelope, yielding `result` on success.
async fn parse_envelope(resp: reqwest::Response) -> Result<Value, ChannelError> {
    let status = resp.status();
    let body_text = resp.text().await.unwrap_or_default();
    let parsed: Value = serde_json::from_str(&body_text).unwrap_or(Value::Null);

    let ok = parsed
        .get("ok")
        .and_then(|v| v.as_bool())
        .unwrap_or(status.is_success());

    if ok {
        return Ok(parsed.get("result").cloned().unwrap_or(Value::Null));
    }

    let error = parsed
        .get("description")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            if body_text.is_empty() {
                None
            } else {
                Some(body_text)
            }
        })
        .unwrap_or_else(|| format!("HTTP {status}"));

    Err(ChannelError::Api(error))
}
