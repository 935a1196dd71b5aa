//! Tokenwarden CLI
//!
//! Command-line interface for obtaining and inspecting client-credentials
//! tokens.
//!
//! # Usage
//!
//! ```bash
//! # Print a bearer token
//! tokenwarden token
//!
//! # Print request headers as JSON
//! tokenwarden headers --format json
//!
//! # Keep a token fresh and report its state every 30 seconds
//! tokenwarden watch --interval 30
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokenwarden_cli::config::{self, CliConfig};
use tokenwarden_core::{AuthConfig, TokenManager, global};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "tokenwarden")]
#[command(about = "Client-credentials token manager")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Identity provider host (overrides config and environment)
    #[arg(long, global = true)]
    host: Option<String>,

    /// OAuth client ID (overrides config and environment)
    #[arg(long, global = true)]
    client_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a valid bearer token
    Token {
        /// Exchange for a new token even if one is cached
        #[arg(short, long)]
        force: bool,
    },

    /// Print the headers for an authenticated JSON request
    Headers {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print diagnostic information about the current token
    Info,

    /// Keep a token fresh in the background and report its state
    Watch {
        /// Seconds between status reports
        #[arg(short, long, default_value_t = 30)]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.log_level);
    apply_flags(&mut config, &cli);

    match cli.command {
        Commands::Token { force } => print_token(config.auth, force).await,
        Commands::Headers { format } => print_headers(config.auth, &format).await,
        Commands::Info => print_info(config.auth).await,
        Commands::Watch { interval } => watch(config.auth, interval).await,
    }
}

fn init_logging(verbose: bool, default_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_flags(config: &mut CliConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.auth.host = host.clone();
    }
    if let Some(client_id) = &cli.client_id {
        config.auth.client_id = client_id.clone();
    }
}

/// Start a manager for a one-shot command; no background task is needed.
async fn one_shot_manager(auth: AuthConfig) -> Result<TokenManager> {
    TokenManager::start(auth.with_auto_refresh(false))
        .await
        .context("Failed to obtain access token")
}

async fn print_token(auth: AuthConfig, force: bool) -> Result<()> {
    let manager = one_shot_manager(auth).await?;
    let token = manager
        .get_token(force)
        .await
        .context("Failed to refresh access token")?;
    println!("{}", token);
    Ok(())
}

async fn print_headers(auth: AuthConfig, format: &str) -> Result<()> {
    let manager = one_shot_manager(auth).await?;
    let headers = manager.headers().await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&headers)?);
        }
        _ => {
            let mut names: Vec<_> = headers.keys().collect();
            names.sort();
            for name in names {
                println!("{}: {}", name, headers[name]);
            }
        }
    }
    Ok(())
}

async fn print_info(auth: AuthConfig) -> Result<()> {
    let manager = one_shot_manager(auth).await?;
    let info = manager.token_info().await;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

async fn watch(auth: AuthConfig, interval_secs: u64) -> Result<()> {
    let manager = global::get_manager(auth.with_auto_refresh(true))
        .await
        .context("Failed to start token manager")?;

    info!("Watching token. Press Ctrl+C to stop.");

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let info = manager.token_info().await;
                println!("{}", serde_json::to_string(&info)?);
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Shutdown signal received, stopping token manager...");
                break;
            }
        }
    }

    global::stop_manager().await;
    info!("Token manager stopped");
    Ok(())
}
