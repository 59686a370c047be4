use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use relaybot::assistant::coordinator::{CoordinatorConfig, ResponseCoordinator};
use relaybot::assistant::openai::OpenAiAssistantClient;
use relaybot::channels::telegram::TelegramApi;
use relaybot::channels::telegram_receive::telegram_receive_loop;
use relaybot::cli::{self, Cli, Command, ConfigCommand};
use relaybot::config::Config;
use relaybot::logging::{self, audit::ExchangeLog};
use relaybot::relay::MessageHandler;
use relaybot::threads::store::open_store;
use relaybot::threads::ThreadRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        // No subcommand or explicit `start` both launch the relay.
        None | Some(Command::Start) => run_relay().await,

        Some(Command::Config(sub)) => {
            match sub {
                ConfigCommand::Show => cli::handle_config_show()?,
                ConfigCommand::Path => cli::handle_config_path()?,
            }
            Ok(())
        }

        Some(Command::Stats) => cli::handle_stats(),

        Some(Command::Version) => {
            cli::handle_version();
            Ok(())
        }
    }
}

/// Run the relay until a shutdown signal arrives.
async fn run_relay() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;
    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.state_dir)?;
    ExchangeLog::init(config.state_dir.clone()).await;

    let store = open_store(&config.thread_db_path, &config.state_dir);
    info!(backend = store.backend_name(), "thread store ready");

    let backend = OpenAiAssistantClient::new(
        config.openai_api_key.clone(),
        config.assistant_id.clone(),
    )?
    .with_base_url(config.openai_api_base_url.clone())?;
    let backend: Arc<dyn relaybot::assistant::backend::AssistantBackend> = Arc::new(backend);

    let registry = Arc::new(ThreadRegistry::new(backend.clone(), store));
    let coordinator = ResponseCoordinator::new(
        backend,
        CoordinatorConfig {
            max_retries: config.max_retries,
            timeout: config.timeout,
            ..CoordinatorConfig::default()
        },
    );

    let telegram = Arc::new(TelegramApi::new(
        config.telegram_api_base_url.clone(),
        config.telegram_token.clone(),
    )?);
    let handler = Arc::new(MessageHandler::new(
        registry,
        coordinator,
        telegram,
        config.allowed_users.clone(),
    ));

    info!("relaybot v{}", env!("CARGO_PKG_VERSION"));
    info!("State directory: {}", config.state_dir.display());
    if config.allowed_users.is_empty() {
        info!("Allow-list: disabled (all users allowed)");
    } else {
        info!("Allow-list: {} users", config.allowed_users.len());
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let receive = tokio::spawn(telegram_receive_loop(
        config.telegram_api_base_url.clone(),
        config.telegram_token.clone(),
        handler,
        shutdown_rx,
    ));

    let reason = await_shutdown_trigger().await;
    info!("Shutdown signal received ({})", reason);
    let _ = shutdown_tx.send(true);

    if let Err(e) = receive.await {
        warn!("receive loop task failed: {e}");
    }

    info!("Relay shut down");
    Ok(())
}

/// Initialize logging based on the RELAYBOT_DEV environment variable.
fn init_logging_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let log_config = if std::env::var("RELAYBOT_DEV")
        .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false)
    {
        logging::LogConfig::development()
    } else {
        logging::LogConfig::production()
    };
    logging::init_logging(log_config)?;
    Ok(())
}

/// Wait for either Ctrl+C or SIGTERM (Unix only) and return a label for logging.
#[cfg(unix)]
async fn await_shutdown_trigger() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "ctrl-c",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!(
                "Failed to install SIGTERM handler: {}; falling back to Ctrl+C only",
                e
            );
            match tokio::signal::ctrl_c().await {
                Ok(()) => "ctrl-c",
                Err(e) => {
                    panic!("Failed to install Ctrl+C handler: {}", e);
                }
            }
        }
    }
}

/// On non-Unix platforms, only Ctrl+C is available.
#[cfg(not(unix))]
async fn await_shutdown_trigger() -> &'static str {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "ctrl-c",
        Err(e) => {
            panic!("Failed to install Ctrl+C handler: {}", e);
        }
    }
}
