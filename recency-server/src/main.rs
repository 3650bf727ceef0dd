#![cfg_attr(not(test), forbid(unsafe_code))]

//! Command line entry point for the recency server.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use recency_server::server;
use recency_shared::config::server::Config;

/// Main CLI structure for the recency server
#[derive(Parser, Debug)]
#[command(name = "recency-server")]
#[command(about = "Conversation summary synchronization server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind, overriding the file and environment
        #[arg(long, short)]
        port: Option<u16>,

        /// Configuration file (yaml, json or toml)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Print the fully resolved configuration as JSON
    Config {
        /// Configuration file (yaml, json or toml)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

async fn handle_serve_command(port: Option<u16>, config: Option<PathBuf>) -> anyhow::Result<()> {
    let resolved = Config::load_config(config, port).context("failed to load configuration")?;
    server::run(resolved).await.context("server exited with an error")
}

fn handle_config_command(config: Option<PathBuf>) -> anyhow::Result<()> {
    let resolved = Config::load_config(config, None).context("failed to load configuration")?;
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => handle_serve_command(port, config).await,
        Commands::Config { config } => handle_config_command(config),
    }
}
