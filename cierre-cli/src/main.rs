//! Cierre CLI
//!
//! Command-line interface for starting and tracking period-close jobs on the
//! Cierre backend.

mod commands;
mod config;
mod notifier;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cierre")]
#[command(about = "Start and track period-close jobs", long_about = None)]
struct Cli {
    /// Backend API base URL
    #[arg(long, env = "CIERRE_API_URL", default_value = "http://localhost:8000/api")]
    api_url: String,

    /// Bearer token sent with every request
    #[arg(long, env = "CIERRE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cierre_cli=info,cierre_poller=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.api_url, cli.token)?;

    handle_command(cli.command, &config).await
}
