//! xmonitor CLI
//!
//! Runs the monitor as a long-lived service or performs one-off checks.

use std::path::PathBuf;

use chrono::Utc;
use clap::{Parser, Subcommand};
use xmonitor::{
    error::{AppError, Result},
    models::Config,
    pipeline::{self, HealthStatus, Monitor},
    storage::{LocalStateStore, StateStore},
};

/// xmonitor - X account watcher with DingTalk alerts
#[derive(Parser, Debug)]
#[command(
    name = "xmonitor",
    version,
    about = "Watch X accounts through Nitter mirrors and push changes to DingTalk"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run both checks periodically until interrupted (default)
    Run,

    /// Run one tweet check and one stats check, then exit
    Once,

    /// Probe mirrors, stats API, webhook and storage
    Health,

    /// Send a test message to the webhook
    TestWebhook,

    /// Fetch and print current statistics for an account
    Stats {
        /// Account handle, without `@`
        username: String,
    },

    /// Validate configuration
    Validate,

    /// Show persisted state for each monitored account
    Info,
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dotenv = dotenvy::dotenv();

    let (mut config, load_error) = match Config::load(&cli.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let env_result = config.apply_env();

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    init_logging(&level);

    if let Ok(path) = dotenv {
        log::debug!("Loaded environment from {}", path.display());
    }
    match load_error {
        None => log::info!("Loaded configuration from {}", cli.config.display()),
        Some(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults and environment.",
            cli.config.display(),
            e
        ),
    }
    if let Err(e) = env_result {
        log::error!("Invalid environment override: {e}");
        return Err(e);
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            // Listen before any work so an early signal still stops gracefully.
            let shutdown = pipeline::shutdown_signal();
            validate(&config)?;
            let monitor = Monitor::from_config(&config)?;
            log::info!(
                "Monitoring {} account(s): {}",
                monitor.usernames().len(),
                monitor.usernames().join(", ")
            );
            pipeline::serve(
                &monitor,
                (
                    config.monitor.tweet_interval(),
                    config.monitor.stats_interval(),
                ),
                shutdown,
            )
            .await;
        }

        Command::Once => {
            validate(&config)?;
            let monitor = Monitor::from_config(&config)?;
            let (tweets, stats) = monitor.run_once().await;
            print_json(&serde_json::json!({ "tweets": tweets, "stats": stats }))?;
        }

        Command::Health => {
            validate(&config)?;
            let monitor = Monitor::from_config(&config)?;
            let report = monitor.health_check().await;
            print_json(&report)?;
            if report.status == HealthStatus::Degraded {
                std::process::exit(2);
            }
        }

        Command::TestWebhook => {
            validate(&config)?;
            let monitor = Monitor::from_config(&config)?;
            if monitor.send_test_message(Utc::now()).await {
                log::info!("✓ Test message delivered");
            } else {
                log::error!("Test message was not delivered");
                std::process::exit(1);
            }
        }

        Command::Stats { username } => {
            config.validate_stats().map_err(|e| {
                log::error!("Config validation failed: {e}");
                e
            })?;
            let monitor = Monitor::from_config(&config)?;
            let snapshot = monitor.lookup_stats(username.trim_start_matches('@')).await?;
            print_json(&snapshot)?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            validate(&config)?;
            log::info!("✓ Config OK");
            log::info!("  accounts: {}", config.monitor.usernames.join(", "));
            log::info!("  mirrors: {}", config.nitter.mirrors.len());
            log::info!(
                "  stats API: {}",
                if config.stats.enabled { "enabled" } else { "disabled" }
            );
        }

        Command::Info => {
            let store = LocalStateStore::new(&config.storage.state_dir);
            log::info!("State directory: {}", store.root_dir().display());
            if config.monitor.usernames.is_empty() {
                log::info!("No accounts configured.");
            }
            for username in &config.monitor.usernames {
                let state = store.load(username).await?;
                if state.is_fresh() {
                    log::info!("@{username}: no state recorded yet");
                }
                print_json(&serde_json::json!({ "username": username, "state": state }))?;
            }
        }
    }

    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    config.validate().map_err(|e: AppError| {
        log::error!("Config validation failed: {e}");
        e
    })
}
