#![forbid(unsafe_code)]
//! govchain node: auto-mining or validating, with the JSON-RPC endpoint

use clap::Parser;
use govchain::config::{load_config, NodeRole, DEFAULT_CONFIG_PATH};
use govchain::node::Node;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    /// Overrides the configured role (miner or validator)
    #[arg(long)]
    role: Option<NodeRole>,
    /// Overrides the configured JSON-RPC port
    #[arg(long)]
    port: Option<u16>,
    /// Overrides the configured miner address
    #[arg(long)]
    miner_address: Option<String>,
    /// Overrides the configured database path
    #[arg(long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(role) = cli.role {
        config.node.role = role;
    }
    if let Some(port) = cli.port {
        config.node.rpc_port = port;
    }
    if let Some(miner_address) = cli.miner_address {
        config.node.miner_address = miner_address;
    }
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    info!(
        config = %cli.config,
        role = ?config.node.role,
        port = config.node.rpc_port,
        "starting govchain node"
    );

    let node = Arc::new(Node::open(config)?);
    node.start().await?;
    Ok(())
}
