//! SmartCare CLI - clinician session management from the terminal
//!
//! Builds the process-wide session manager over the configured backend and
//! runs one command against it:
//! - Inspect the resolved session and gate decisions
//! - Sign in, sign up, sign out
//! - Complete a profile after a partially failed sign-up
//! - Watch session changes

use clap::Parser;
use smartcare_session::SessionManager;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod backend;
mod commands;
mod config;
mod output;

use backend::Backend;
use commands::Commands;
use config::{AppConfig, BackendKind};

/// SmartCare CLI
#[derive(Parser)]
#[command(name = "smartcare")]
#[command(about = "SmartCare - clinician identity and profile sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SMARTCARE_CONFIG")]
    config: Option<String>,

    /// Backend override
    #[arg(short, long, value_enum)]
    backend: Option<BackendKind>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: output::OutputFormat,

    /// Log level override
    #[arg(long, env = "SMARTCARE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(level) = cli.log_level.clone() {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    init_tracing(&config);

    if let Commands::Config = cli.command {
        return output::print_json(&config);
    }
    if matches!(cli.command, Commands::Demo) && config.backend != BackendKind::Memory {
        anyhow::bail!("the demo only runs on the memory backend");
    }

    let backend = match Backend::build(&config) {
        Ok(backend) => backend,
        Err(err) => {
            output::print_error(&format!("{err:#}"));
            std::process::exit(2);
        }
    };
    let manager =
        SessionManager::start(backend.identity, backend.profiles, config.session.clone()).await;

    let result = commands::execute(cli.command, &manager, cli.output).await;
    manager.shutdown().await;
    result
}

fn init_tracing(config: &AppConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    // Logs go to stderr; stdout carries command output.
    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
