//! Telegram inbound receive loop.
//!
//! Long-polls the Bot API (`getUpdates`) and hands each text-bearing update
//! to the relay handler. Updates are processed one at a time, end to end, so
//! a user's messages are answered in the order they arrived.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::channels::telegram_inbound::{self, TelegramUpdate};
use crate::relay::MessageHandler;

/// Long-poll timeout passed to Telegram getUpdates.
const POLL_TIMEOUT_SECS: u64 = 30;
/// Client-side request timeout (must exceed poll timeout).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(POLL_TIMEOUT_SECS + 10);
/// Backoff between failed poll attempts.
const ERROR_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct TelegramGetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
    #[serde(default)]
    description: Option<String>,
}

/// Run the Telegram long-polling receive loop until shutdown is signalled.
pub async fn telegram_receive_loop(
    base_url: String,
    bot_token: String,
    handler: Arc<MessageHandler>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("failed to build Telegram receive HTTP client: {e}");
            return;
        }
    };
    let updates_url = build_get_updates_url(&base_url, &bot_token);

    info!(base_url = %base_url, "Telegram receive loop started");

    let mut offset: Option<i64> = None;
    let mut consecutive_errors: u32 = 0;

    loop {
        if *shutdown.borrow() {
            info!("Telegram receive loop shutting down");
            break;
        }

        let mut had_error = false;
        let request_url = build_poll_request_url(&updates_url, offset);
        match client.get(&request_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                match resp.json::<TelegramGetUpdatesResponse>().await {
                    Ok(payload) => {
                        if !payload.ok {
                            had_error = true;
                            consecutive_errors += 1;
                            let description = payload.description.unwrap_or_else(|| {
                                "telegram getUpdates returned ok=false".to_string()
                            });
                            if consecutive_errors <= 3 {
                                warn!("Telegram getUpdates returned error: {description}");
                            }
                        } else {
                            if consecutive_errors > 0 {
                                info!(
                                    "Telegram receive loop recovered after {} errors",
                                    consecutive_errors
                                );
                                consecutive_errors = 0;
                            }

                            for update in payload.result {
                                offset = next_offset_after_update(offset, update.update_id);
                                let Some(inbound) = telegram_inbound::extract_inbound(&update)
                                else {
                                    continue;
                                };
                                handler.handle(&inbound).await;
                            }
                        }
                    }
                    Err(err) => {
                        had_error = true;
                        consecutive_errors += 1;
                        if consecutive_errors <= 3 {
                            warn!("Telegram getUpdates response parse failed: {err}");
                        }
                    }
                }
            }
            Ok(resp) => {
                had_error = true;
                consecutive_errors += 1;
                if consecutive_errors <= 3 {
                    warn!("Telegram getUpdates HTTP {}", resp.status());
                }
            }
            Err(err) => {
                had_error = true;
                consecutive_errors += 1;
                let message = classify_transport_error(&err);
                if consecutive_errors <= 3 {
                    warn!("Telegram getUpdates request failed: {message}");
                } else if consecutive_errors == 4 {
                    warn!(
                        "Telegram receive errors continuing (suppressing further logs until recovery)"
                    );
                }
            }
        }

        if had_error {
            tokio::select! {
                _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Telegram receive loop shutting down");
                        break;
                    }
                }
            }
        } else {
            debug!("Telegram long-poll request completed");
        }
    }
}

fn build_get_updates_url(base_url: &str, bot_token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/bot{bot_token}/getUpdates")
}

fn build_poll_request_url(base_url: &str, offset: Option<i64>) -> String {
    let mut url = format!("{base_url}?timeout={POLL_TIMEOUT_SECS}");
    if let Some(offset) = offset {
        url.push_str("&offset=");
        url.push_str(&offset.to_string());
    }
    url
}

fn next_offset_after_update(current: Option<i64>, update_id: Option<i64>) -> Option<i64> {
    let Some(update_id) = update_id else {
        return current;
    };
    let next = update_id.saturating_add(1);
    Some(current.map_or(next, |current_value| current_value.max(next)))
}

fn classify_transport_error(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "request timeout"
    } else if err.is_connect() {
        "connection error"
    } else {
        "request failed"
    }
}
