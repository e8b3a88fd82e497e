//! Mining orchestrator.
//!
//! One loop owns the node session and the worker pool: poll for a
//! template, publish work when the pre-PoW hash changes, drain results,
//! submit winners, report hashrate. Steady-state mining never propagates
//! an error out of this loop; everything is logged and counted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use shiokaze_pow::{bits_to_target, calculate_pre_pow_hash, Hash32};

use crate::client::{NodeClient, SubmitOutcome};
use crate::config::MinerConfig;
use crate::error::ClientResult;
use crate::rpc::RpcBlock;
use crate::worker::{MiningResult, MiningTask, WorkerPool};

/// A template retained for late-arriving results.
struct CachedTemplate {
    block: RpcBlock,
    submitted: bool,
}

/// Outcome of matching a result to its originating template.
enum Claim<'a> {
    /// First result for this template; the caller submits it.
    Submit(&'a RpcBlock),
    /// A result for this template was already submitted.
    AlreadySubmitted,
    /// The template aged out of the cache before its result arrived.
    Expired,
}

/// Bounded FIFO of recent templates keyed by id.
struct TemplateCache {
    entries: HashMap<u64, CachedTemplate>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl TemplateCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn insert(&mut self, id: u64, block: RpcBlock) {
        while self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
        self.order.push_back(id);
        self.entries.insert(
            id,
            CachedTemplate {
                block,
                submitted: false,
            },
        );
    }

    fn claim(&mut self, id: u64) -> Claim<'_> {
        match self.entries.get_mut(&id) {
            None => Claim::Expired,
            Some(cached) if cached.submitted => Claim::AlreadySubmitted,
            Some(cached) => {
                cached.submitted = true;
                Claim::Submit(&cached.block)
            }
        }
    }
}

/// Counters and the rolling hashrate window.
struct MinerStats {
    started: Instant,
    total_hashes: u64,
    templates: u64,
    found: u64,
    accepted: u64,
    rejected: u64,
    submit_failures: u64,
    window: VecDeque<u64>,
}

impl MinerStats {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            total_hashes: 0,
            templates: 0,
            found: 0,
            accepted: 0,
            rejected: 0,
            submit_failures: 0,
            window: VecDeque::with_capacity(MinerConfig::HASHRATE_WINDOW),
        }
    }

    /// Record one stats tick worth of hashes; returns the rolling average
    /// per tick.
    fn record_tick(&mut self, hashes: u64) -> f64 {
        self.total_hashes += hashes;
        while self.window.len() >= MinerConfig::HASHRATE_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(hashes);
        let sum: u64 = self.window.iter().sum();
        sum as f64 / self.window.len().max(1) as f64
    }
}

fn format_hashrate(rate: f64) -> String {
    if rate >= 1_000_000.0 {
        format!("{:.2} MH/s", rate / 1_000_000.0)
    } else if rate >= 1_000.0 {
        format!("{:.1} kH/s", rate / 1_000.0)
    } else {
        format!("{rate:.0} H/s")
    }
}

/// Owns the node session, the worker pool, and the template lifecycle.
pub struct Miner {
    config: MinerConfig,
    client: NodeClient,
    pool: WorkerPool,
    cache: TemplateCache,
    stats: MinerStats,
    running: Arc<AtomicBool>,
    current_pre_pow: Option<Hash32>,
    next_template_id: u64,
    consecutive_failures: u32,
    unsynced_warned: bool,
}

impl Miner {
    /// Connect to the node and start the worker pool.
    pub fn new(config: MinerConfig, running: Arc<AtomicBool>) -> ClientResult<Self> {
        let client = NodeClient::connect(config.rpc_url.clone(), config.extra_data.clone())?;
        let pool = WorkerPool::new(config.workers, config.random_nonce, Arc::clone(&running));
        Ok(Self {
            config,
            client,
            pool,
            cache: TemplateCache::new(MinerConfig::TEMPLATE_CACHE_SIZE),
            stats: MinerStats::new(),
            running,
            current_pre_pow: None,
            next_template_id: 0,
            consecutive_failures: 0,
            unsynced_warned: false,
        })
    }

    /// Run until the shared running flag drops.
    pub fn run(mut self) {
        info!(
            workers = self.pool.num_workers(),
            poll_interval_ms = MinerConfig::POLL_INTERVAL.as_millis() as u64,
            "mining loop started"
        );

        let mut last_poll: Option<Instant> = None;
        let mut last_stats = Instant::now();

        while self.running.load(Ordering::Relaxed) {
            let poll_due = last_poll.map_or(true, |at| at.elapsed() >= MinerConfig::POLL_INTERVAL);
            if poll_due {
                self.poll_template();
                last_poll = Some(Instant::now());
            }

            while let Some(result) = self.pool.try_recv_result() {
                self.handle_result(result);
            }

            if last_stats.elapsed() >= MinerConfig::STATS_INTERVAL {
                self.report_stats();
                last_stats = Instant::now();
            }

            thread::sleep(MinerConfig::RESULT_POLL);
        }

        self.finish();
    }

    /// One poll cycle. All failure modes end here: transport errors feed
    /// the reconnect counter, node-declined cycles and undecodable
    /// templates are skipped.
    fn poll_template(&mut self) {
        let response = match self.client.get_block_template(&self.config.wallet) {
            Ok(Some(response)) => {
                self.consecutive_failures = 0;
                response
            }
            Ok(None) => {
                self.consecutive_failures = 0;
                return;
            }
            Err(e) => {
                self.consecutive_failures += 1;
                debug!(
                    error = %e,
                    failures = self.consecutive_failures,
                    "template poll failed"
                );
                if self.consecutive_failures >= MinerConfig::MAX_CONSECUTIVE_FAILURES {
                    warn!(
                        failures = self.consecutive_failures,
                        "node unreachable, forcing reconnect"
                    );
                    self.client.reconnect();
                    self.consecutive_failures = 0;
                }
                return;
            }
        };

        if !response.is_synced {
            if !self.unsynced_warned {
                warn!("node is not synced, skipping templates until it is");
                self.unsynced_warned = true;
            }
            return;
        }
        self.unsynced_warned = false;

        let header = &response.block.header;
        let pre_pow_hash = match calculate_pre_pow_hash(header) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, "dropping undecodable template");
                return;
            }
        };

        // Same work as before; publishing would only force every worker to
        // regenerate an identical matrix.
        if self.current_pre_pow == Some(pre_pow_hash) {
            return;
        }

        let template_id = self.next_template_id;
        self.next_template_id += 1;

        let task = MiningTask {
            pre_pow_hash,
            timestamp: header.timestamp,
            target: bits_to_target(header.bits),
            template_id,
        };
        let bits_hex = format!("{:#010x}", header.bits);
        info!(
            template_id,
            bits = %bits_hex,
            daa_score = header.daa_score,
            "new template"
        );

        self.cache.insert(template_id, response.block);
        self.current_pre_pow = Some(pre_pow_hash);
        self.stats.templates += 1;
        self.pool.publish(task);
    }

    /// Match a worker result to its template and submit the first one.
    fn handle_result(&mut self, result: MiningResult) {
        self.stats.found += 1;
        debug!(
            worker_id = result.worker_id,
            template_id = result.template_id,
            nonce = result.nonce,
            pow_hash = %hex::encode(result.pow_hash),
            "draining result"
        );

        match self.cache.claim(result.template_id) {
            Claim::Submit(block) => {
                let mut submission = block.clone();
                submission.header.nonce = result.nonce;
                match self.client.submit_block(&submission) {
                    Ok(SubmitOutcome::Accepted) => {
                        self.stats.accepted += 1;
                        info!(
                            template_id = result.template_id,
                            nonce = result.nonce,
                            "block accepted"
                        );
                    }
                    Ok(SubmitOutcome::Rejected(reason)) => {
                        self.stats.rejected += 1;
                        warn!(
                            template_id = result.template_id,
                            reason = %reason,
                            "block rejected"
                        );
                        self.check_rejection_anomaly();
                    }
                    Err(e) => {
                        self.stats.submit_failures += 1;
                        warn!(error = %e, "block submission failed");
                    }
                }
            }
            Claim::AlreadySubmitted => {
                debug!(
                    template_id = result.template_id,
                    "template already submitted, dropping duplicate result"
                );
            }
            Claim::Expired => {
                warn!(
                    template_id = result.template_id,
                    "template expired before its result arrived"
                );
            }
        }
    }

    /// Rejections are normal race losses, but losing every race points at
    /// a header encoding that never matches the node.
    fn check_rejection_anomaly(&self) {
        let stats = &self.stats;
        if stats.accepted == 0 && stats.rejected >= 5 && stats.rejected % 5 == 0 {
            warn!(
                rejected = stats.rejected,
                "every submission so far was rejected, header serialization may not match the node"
            );
        }
    }

    fn report_stats(&mut self) {
        let tick_hashes = self.pool.reset_hash_counts();
        let average = self.stats.record_tick(tick_hashes);
        info!(
            hashrate = %format_hashrate(tick_hashes as f64),
            average = %format_hashrate(average),
            templates = self.stats.templates,
            found = self.stats.found,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            "mining stats"
        );
    }

    fn finish(self) {
        let runtime = self.stats.started.elapsed();
        let average = self.stats.total_hashes as f64 / runtime.as_secs_f64().max(1.0);
        self.pool.shutdown(MinerConfig::POLL_INTERVAL * 10);
        info!(
            runtime_secs = runtime.as_secs(),
            total_hashes = self.stats.total_hashes,
            average = %format_hashrate(average),
            found = self.stats.found,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            submit_failures = self.stats.submit_failures,
            "miner stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shiokaze_pow::BlockHeader;

    fn block(daa_score: u64) -> RpcBlock {
        RpcBlock {
            header: BlockHeader {
                daa_score,
                ..BlockHeader::default()
            },
            transactions: Vec::new(),
        }
    }

    #[test]
    fn first_claim_submits_later_claims_do_not() {
        let mut cache = TemplateCache::new(10);
        cache.insert(1, block(1));

        assert!(matches!(cache.claim(1), Claim::Submit(_)));
        assert!(matches!(cache.claim(1), Claim::AlreadySubmitted));
        assert!(matches!(cache.claim(1), Claim::AlreadySubmitted));
    }

    #[test]
    fn evicted_template_claims_as_expired() {
        let mut cache = TemplateCache::new(3);
        for id in 0..4 {
            cache.insert(id, block(id));
        }

        // id 0 aged out; the newest three are still matchable.
        assert!(matches!(cache.claim(0), Claim::Expired));
        assert!(matches!(cache.claim(1), Claim::Submit(_)));
        assert!(matches!(cache.claim(3), Claim::Submit(_)));
    }

    #[test]
    fn unknown_template_claims_as_expired() {
        let mut cache = TemplateCache::new(3);
        assert!(matches!(cache.claim(42), Claim::Expired));
    }

    #[test]
    fn eviction_is_fifo() {
        let mut cache = TemplateCache::new(2);
        cache.insert(10, block(0));
        cache.insert(11, block(0));
        cache.insert(12, block(0));

        assert!(matches!(cache.claim(10), Claim::Expired));
        assert!(matches!(cache.claim(11), Claim::Submit(_)));
        assert!(matches!(cache.claim(12), Claim::Submit(_)));
    }

    #[test]
    fn claimed_block_carries_template_payload() {
        let mut cache = TemplateCache::new(2);
        cache.insert(5, block(777));
        match cache.claim(5) {
            Claim::Submit(claimed) => assert_eq!(claimed.header.daa_score, 777),
            _ => panic!("expected a submittable claim"),
        }
    }

    #[test]
    fn rolling_window_is_bounded() {
        let mut stats = MinerStats::new();
        for _ in 0..(MinerConfig::HASHRATE_WINDOW + 20) {
            stats.record_tick(1_000);
        }
        assert_eq!(stats.window.len(), MinerConfig::HASHRATE_WINDOW);
        assert_eq!(stats.total_hashes, (MinerConfig::HASHRATE_WINDOW + 20) as u64 * 1_000);
    }

    #[test]
    fn rolling_average_tracks_recent_ticks() {
        let mut stats = MinerStats::new();
        assert_eq!(stats.record_tick(100), 100.0);
        assert_eq!(stats.record_tick(300), 200.0);
    }

    #[test]
    fn hashrate_units_scale() {
        assert_eq!(format_hashrate(512.0), "512 H/s");
        assert_eq!(format_hashrate(2_500.0), "2.5 kH/s");
        assert_eq!(format_hashrate(3_250_000.0), "3.25 MH/s");
    }
}
