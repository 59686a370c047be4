//! Message relay.
//!
//! Glues the Telegram channel to the assistant: routes commands, enforces
//! the user allow-list, drives the per-user thread lifecycle, and records
//! each completed exchange in the audit log.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::assistant::coordinator::{CoordinatorError, ResponseCoordinator};
use crate::channels::telegram::{ChannelError, TelegramApi};
use crate::channels::telegram_inbound::TelegramInbound;
use crate::logging::audit;
use crate::threads::ThreadRegistry;

const NO_ACCESS_TEXT: &str = "❌ You don't have access to this bot.";
const RESET_DONE_TEXT: &str = "✅ Conversation context has been reset. Starting fresh!";
const RESET_NOTHING_TEXT: &str = "ℹ️ No conversation context to reset.";
const GENERIC_ERROR_TEXT: &str =
    "❌ Sorry, I encountered an error while processing your message. Please try again later.";
const TIMEOUT_ERROR_TEXT: &str =
    "⏳ The assistant took too long to respond. Please try again in a moment.";
const START_TEXT: &str =
    "👋 Hi! Send me a message and I'll pass it along to the assistant.\n\
     Use /reset to start a fresh conversation, or /help for more.";
const HELP_TEXT: &str = "🤖 Available commands:\n\
     /start - introduction\n\
     /help - this message\n\
     /reset - clear your conversation context\n\
     /stats - bot statistics";

/// Outbound delivery seam, implemented by [`TelegramApi`].
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;
    async fn send_chat_action(&self, chat_id: i64) -> Result<(), ChannelError>;
}

#[async_trait]
impl OutboundChannel for TelegramApi {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        TelegramApi::send_message(self, chat_id, text).await
    }

    async fn send_chat_action(&self, chat_id: i64) -> Result<(), ChannelError> {
        TelegramApi::send_chat_action(self, chat_id).await
    }
}

/// Routes inbound Telegram messages to commands or the assistant.
pub struct MessageHandler {
    registry: Arc<ThreadRegistry>,
    coordinator: ResponseCoordinator,
    outbound: Arc<dyn OutboundChannel>,
    allowed_users: Vec<i64>,
}

impl MessageHandler {
    pub fn new(
        registry: Arc<ThreadRegistry>,
        coordinator: ResponseCoordinator,
        outbound: Arc<dyn OutboundChannel>,
        allowed_users: Vec<i64>,
    ) -> Self {
        Self {
            registry,
            coordinator,
            outbound,
            allowed_users,
        }
    }

    /// An empty allow-list admits everyone.
    fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.contains(&user_id)
    }

    /// Handle one inbound message end to end. Errors are reported to the
    /// user as short notices and logged in full; this never propagates.
    pub async fn handle(&self, inbound: &TelegramInbound) {
        if let Some(command) = parse_command(&inbound.text) {
            self.handle_command(inbound, &command).await;
        } else {
            self.handle_text(inbound).await;
        }
    }

    async fn handle_command(&self, inbound: &TelegramInbound, command: &str) {
        match command {
            "/start" => self.reply(inbound.chat_id, START_TEXT).await,
            "/help" => self.reply(inbound.chat_id, HELP_TEXT).await,
            "/reset" => {
                if !self.is_allowed(inbound.sender_id) {
                    warn!(user_id = inbound.sender_id, "unauthorized /reset");
                    self.reply(inbound.chat_id, NO_ACCESS_TEXT).await;
                    return;
                }
                let cleared = self.registry.clear(inbound.sender_id);
                let text = if cleared {
                    RESET_DONE_TEXT
                } else {
                    RESET_NOTHING_TEXT
                };
                self.reply(inbound.chat_id, text).await;
            }
            "/stats" => {
                if !self.is_allowed(inbound.sender_id) {
                    warn!(user_id = inbound.sender_id, "unauthorized /stats");
                    self.reply(inbound.chat_id, NO_ACCESS_TEXT).await;
                    return;
                }
                let stats = self.registry.stats();
                let whitelist = if self.allowed_users.is_empty() {
                    "❌ (All users allowed)".to_string()
                } else {
                    format!("✅ ({} users)", self.allowed_users.len())
                };
                let text = format!(
                    "📊 Bot Statistics:\n\
                     • Active conversations: {}\n\
                     • Total threads: {}\n\
                     • Whitelist: {}",
                    stats.active_users, stats.total_threads, whitelist
                );
                self.reply(inbound.chat_id, &text).await;
                info!(user_id = inbound.sender_id, "showed stats");
            }
            other => {
                warn!(user_id = inbound.sender_id, command = other, "unknown command");
                self.reply(inbound.chat_id, "❓ Unknown command. Try /help.")
                    .await;
            }
        }
    }

    async fn handle_text(&self, inbound: &TelegramInbound) {
        if !self.is_allowed(inbound.sender_id) {
            warn!(user_id = inbound.sender_id, "unauthorized message");
            self.reply(inbound.chat_id, NO_ACCESS_TEXT).await;
            return;
        }

        if let Err(e) = self.outbound.send_chat_action(inbound.chat_id).await {
            warn!("failed to send typing indicator: {e}");
        }

        let started = Instant::now();

        let thread_id = match self.registry.get_or_create(inbound.sender_id).await {
            Ok(thread_id) => thread_id,
            Err(e) => {
                error!(user_id = inbound.sender_id, "thread lookup failed: {e}");
                self.reply(inbound.chat_id, GENERIC_ERROR_TEXT).await;
                return;
            }
        };

        let answer = match self.coordinator.respond(&thread_id, &inbound.text).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(
                    user_id = inbound.sender_id,
                    thread_id = %thread_id,
                    "assistant exchange failed: {e}"
                );
                let notice = match e {
                    CoordinatorError::Timeout { .. } => TIMEOUT_ERROR_TEXT,
                    _ => GENERIC_ERROR_TEXT,
                };
                self.reply(inbound.chat_id, notice).await;
                return;
            }
        };

        let response_ms = started.elapsed().as_millis() as u64;
        self.reply(inbound.chat_id, &answer).await;

        audit::record_exchange(audit::ExchangeRecord::new(
            inbound.sender_id,
            &inbound.sender_name,
            &inbound.text,
            &answer,
            &thread_id,
            response_ms,
        ));
        info!(
            user_id = inbound.sender_id,
            thread_id = %thread_id,
            response_ms,
            "exchange completed"
        );
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.outbound.send_message(chat_id, text).await {
            error!(chat_id, "failed to send reply: {e}");
        }
    }
}

/// Return the leading bot command, with any `@botname` suffix stripped.
fn parse_command(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let command = first.split('@').next().unwrap_or(first);
    Some(command.to_string())
}
