//! relaybot library
//!
//! Relays Telegram messages to an OpenAI assistant, keeping one durable
//! conversation thread per user. The library is split into the assistant
//! client and response coordination, the thread registry and its stores,
//! the Telegram channel, and the relay glue between them.

pub mod assistant;
pub mod channels;
pub mod cli;
pub mod config;
pub mod logging;
pub mod relay;
pub mod threads;
