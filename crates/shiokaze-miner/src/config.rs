//! Miner configuration.
//!
//! Everything comes from CLI flags; there is no config file and no state
//! carried across restarts.

use std::time::Duration;

use crate::Args;

/// Network to mine on, selecting the default RPC endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    fn default_endpoint(self) -> &'static str {
        match self {
            Network::Mainnet => "localhost:16110",
            Network::Testnet => "localhost:16210",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

/// Resolved miner configuration.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    pub network: Network,
    /// Pay address for coinbase rewards.
    pub wallet: String,
    /// Node JSON-RPC endpoint.
    pub rpc_url: String,
    /// Number of hashing workers.
    pub workers: usize,
    /// Draw every nonce at random instead of walking a per-worker range.
    pub random_nonce: bool,
    /// Tag sent with template requests.
    pub extra_data: String,
}

impl MinerConfig {
    /// Template poll cadence, independent of mining progress.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
    /// Hashrate reporting cadence.
    pub const STATS_INTERVAL: Duration = Duration::from_secs(1);
    /// Orchestrator idle sleep between result-queue drains.
    pub const RESULT_POLL: Duration = Duration::from_millis(50);
    /// Rolling hashrate window, in stats ticks.
    pub const HASHRATE_WINDOW: usize = 60;
    /// Bounded template cache so late results stay matchable.
    pub const TEMPLATE_CACHE_SIZE: usize = 100;
    /// Backoff before rebuilding a failed node session.
    pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);
    /// Consecutive poll failures before forcing a reconnect.
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

    pub fn from_args(args: &Args) -> Self {
        let network = if args.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        };
        let endpoint = args
            .address
            .clone()
            .unwrap_or_else(|| network.default_endpoint().to_string());
        let workers = if args.workers == 0 {
            num_cpus::get()
        } else {
            args.workers
        };

        Self {
            network,
            wallet: args.wallet.clone(),
            rpc_url: format!("http://{endpoint}"),
            workers,
            random_nonce: args.random_nonce,
            extra_data: format!("shiokaze/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            wallet: "kaspa:qqtestwallet".into(),
            workers: 0,
            testnet: false,
            address: None,
            random_nonce: false,
            log_level: "info".into(),
        }
    }

    #[test]
    fn zero_workers_auto_detects_cpus() {
        let config = MinerConfig::from_args(&base_args());
        assert!(config.workers >= 1);
    }

    #[test]
    fn testnet_selects_testnet_endpoint() {
        let mut args = base_args();
        args.testnet = true;
        let config = MinerConfig::from_args(&args);
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.rpc_url, "http://localhost:16210");
    }

    #[test]
    fn explicit_address_overrides_default() {
        let mut args = base_args();
        args.address = Some("10.0.0.5:16110".into());
        let config = MinerConfig::from_args(&args);
        assert_eq!(config.rpc_url, "http://10.0.0.5:16110");
    }
}
