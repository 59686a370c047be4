//! CLI subcommand definitions and handlers.
//!
//! Uses clap derive to define the subcommand hierarchy:
//! - `start` (default) -- run the relay
//! - `config show|path` -- inspect the resolved configuration
//! - `stats` -- print thread store counts without starting the relay
//! - `version` -- print version info

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::threads::store::open_store;

/// Telegram to assistant message relay.
#[derive(Parser, Debug)]
#[command(
    name = "relaybot",
    version = env!("CARGO_PKG_VERSION"),
    about = "relaybot — relay Telegram messages to an OpenAI assistant"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the relay (default when no subcommand is given).
    Start,

    /// Inspect the resolved configuration.
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Print thread store counts without starting the relay.
    Stats,

    /// Print version information.
    Version,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the resolved configuration (secrets redacted).
    Show,

    /// Print the resolved state directory and thread store paths.
    Path,
}

// ---------------------------------------------------------------------------
// Subcommand handlers
// ---------------------------------------------------------------------------

/// Run the `config show` subcommand.
pub fn handle_config_show() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    println!("{config:#?}");
    Ok(())
}

/// Run the `config path` subcommand.
pub fn handle_config_path() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    println!("state dir: {}", config.state_dir.display());
    println!("thread db: {}", config.thread_db_path.display());
    Ok(())
}

/// Run the `stats` subcommand -- open the thread store offline and report
/// its counts.
pub fn handle_stats() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let store = open_store(&config.thread_db_path, &config.state_dir);
    let count = store.count()?;

    println!("Thread store ({})", store.backend_name());
    println!("  Path:    {}", config.thread_db_path.display());
    println!("  Threads: {count}");
    Ok(())
}

/// Run the `version` subcommand.
pub fn handle_version() {
    println!("relaybot {}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Platform: {} ({})",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}
