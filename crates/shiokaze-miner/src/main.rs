//! ShioKaze - a CPU mining client for the Kaspa BlockDAG network.
//!
//! Polls a node for block templates, runs HeavyHash across a pool of
//! worker threads, and submits winning nonces back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod client;
mod config;
mod error;
mod miner;
mod rpc;
mod worker;

use config::MinerConfig;
use error::ClientError;
use miner::Miner;

/// CPU miner for the Kaspa BlockDAG network.
#[derive(Parser, Debug)]
#[command(name = "shiokaze")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Kaspa address mining rewards are paid to
    #[arg(short, long)]
    pub wallet: String,

    /// Number of hashing workers (0 = number of CPUs)
    #[arg(short = 'n', long, default_value = "0")]
    pub workers: usize,

    /// Mine on testnet
    #[arg(long)]
    pub testnet: bool,

    /// Node RPC endpoint as host:port (defaults per network)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Draw nonces at random instead of walking per-worker ranges
    #[arg(short, long)]
    pub random_nonce: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("ShioKaze v{}", env!("CARGO_PKG_VERSION"));

    // A wrong hash pipeline is indistinguishable from bad luck once
    // mining starts, so a vector mismatch refuses to start at all.
    shiokaze_pow::self_check().context("proof-of-work self check failed, refusing to mine")?;
    info!("proof-of-work self check passed");

    let config = MinerConfig::from_args(&args);
    let nonce_policy = if config.random_nonce {
        "random"
    } else {
        "sequential"
    };
    info!(
        network = config.network.name(),
        wallet = %elide(&config.wallet),
        workers = config.workers,
        nonce_policy,
        endpoint = %config.rpc_url,
        "starting miner"
    );

    let running = Arc::new(AtomicBool::new(true));
    let worker_flag = Arc::clone(&running);

    // The miner is fully synchronous (blocking RPC, thread workers); it
    // lives on a blocking task so this runtime only handles signals.
    let mut mining = tokio::task::spawn_blocking(move || -> Result<(), ClientError> {
        let miner = Miner::new(config, worker_flag)?;
        miner.run();
        Ok(())
    });

    tokio::select! {
        result = &mut mining => {
            result.context("mining task panicked")?.context("miner terminated")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            running.store(false, Ordering::Relaxed);
            (&mut mining).await.context("mining task panicked")?.context("miner terminated")?;
        }
    }

    Ok(())
}

/// Elide the middle of a wallet address for log lines.
fn elide(address: &str) -> String {
    if address.len() <= 26 {
        address.to_string()
    } else {
        format!(
            "{}..{}",
            &address[..16],
            &address[address.len() - 8..]
        )
    }
}
