//! Main binary for the lineup notification dispatcher
//!
//! Long-running process that watches the scheduled-shows table and sends one
//! notification email per show at air time. Runs dispatch cycles every half
//! hour (plus one at startup) and shuts down gracefully on SIGINT/SIGTERM.

use clap::{Arg, ArgAction, Command};
use lineup_notifier::{NotifierConfig, ShowNotifier};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    let matches = create_cli().get_matches();

    init_tracing(matches.get_one::<String>("log-level").map(String::as_str))?;

    let config = load_config(&matches)?;
    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    info!("Starting lineup notification dispatcher");

    let mut notifier = ShowNotifier::new(config).await.map_err(|e| {
        error!("Failed to initialize dispatcher: {}", e);
        e
    })?;

    if matches.get_flag("once") {
        info!("Running a single dispatch cycle");
        notifier.run_once().await;
        info!("Dispatch cycle finished");
        return Ok(());
    }

    notifier.start();
    info!("Dispatcher started, cycles run at :00 and :30 of every hour");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");
    if let Err(e) = notifier.stop().await {
        warn!("Scheduler did not stop cleanly: {}", e);
    }

    info!("Lineup notification dispatcher stopped gracefully");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(level: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_filter = format!(
        "lineup_notifier={},sqlx=warn",
        level.unwrap_or("info")
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();

    Ok(())
}

/// Create CLI argument parser
fn create_cli() -> Command {
    Command::new("lineup-notifier")
        .version("1.0.0")
        .about("Lineup notification dispatcher - sends show notifications at air time")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("database-url")
                .long("database-url")
                .value_name("URL")
                .help("Postgres connection string (overrides DATABASE_URL)"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .action(ArgAction::SetTrue)
                .help("Run a single dispatch cycle and exit"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
}

/// Load configuration from file and environment
fn load_config(
    matches: &clap::ArgMatches,
) -> Result<NotifierConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = if let Some(config_file) = matches.get_one::<String>("config") {
        info!("Loading configuration from file: {}", config_file);
        std::env::set_var("NOTIFIER_CONFIG_FILE", config_file);
        NotifierConfig::from_env()
            .map_err(|e| format!("Failed to load configuration from file: {}", e))?
    } else {
        NotifierConfig::from_env().unwrap_or_else(|e| {
            warn!(
                "Failed to load configuration from environment: {}, using defaults",
                e
            );
            NotifierConfig::default()
        })
    };

    if let Some(url) = matches.get_one::<String>("database-url") {
        config.database.url = url.clone();
    }

    Ok(config)
}

/// Wait for shutdown signals
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}
