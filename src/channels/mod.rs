//! Telegram channel.
//!
//! Outbound delivery via the Bot API ([`telegram::TelegramApi`]), inbound
//! update parsing ([`telegram_inbound`]), and the long-polling receive loop
//! ([`telegram_receive`]) that feeds updates to the relay handler.

pub mod telegram;
pub mod telegram_inbound;
pub mod telegram_receive;

pub use telegram::{ChannelError, TelegramApi};
pub use telegram_inbound::{extract_inbound, TelegramInbound, TelegramUpdate};
pub use telegram_receive::telegram_receive_loop;
