#![forbid(unsafe_code)]
//! Mines one block on top of the persisted chain.
//!
//! The persisted snapshot holds only committed blocks, so pending work comes
//! from `--transactions`, a JSON array of signed transactions.

use clap::Parser;
use govchain::blockchain::Blockchain;
use govchain::clock::system_clock;
use govchain::config::{load_config, DEFAULT_CONFIG_PATH};
use govchain::persistence::{Database, Persistence};
use govchain::transaction::Transaction;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address credited with the block reward
    miner_address: String,
    /// Path to the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    /// JSON file holding an array of signed transactions to include
    #[arg(long)]
    transactions: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let persistence: Arc<dyn Persistence> = Arc::new(Database::open(&config.database.path)?);
    let mut chain = Blockchain::load_or_genesis(&config.chain, system_clock(), persistence)?;

    if let Some(path) = &cli.transactions {
        let raw = std::fs::read_to_string(path)?;
        let pending: Vec<Transaction> = serde_json::from_str(&raw)?;
        for tx in pending {
            let hash = tx.hash.clone();
            if let Err(e) = chain.submit_transaction(tx) {
                warn!("Skipping transaction {}: {}", hash, e);
            }
        }
    }

    println!(
        "Mining block {} at difficulty {} ({} pending)",
        chain.height(),
        chain.difficulty,
        chain.mempool.len()
    );

    let start = Instant::now();
    let block = match chain.mine_block(&cli.miner_address) {
        Ok(block) => block,
        Err(e) => {
            eprintln!("Nothing mined: {}", e);
            std::process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    println!("Block:        {}", block.index);
    println!("Hash:         {}", block.hash);
    println!("Previous:     {}", block.previous_hash);
    println!("Nonce:        {}", block.nonce);
    println!("Transactions: {}", block.transactions.len());
    println!("Elapsed:      {:.2?}", elapsed);
    println!(
        "Balance of {}: {}",
        cli.miner_address,
        chain.get_balance(&cli.miner_address)
    );
    Ok(())
}
