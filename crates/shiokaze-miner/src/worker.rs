//! Hashing workers.
//!
//! Each worker runs in its own OS thread and blocks only on hashing. Work
//! arrives over a watch channel: workers always observe the latest task and
//! may skip intermediate templates entirely. The matrix is never shipped
//! across the channel; every worker re-derives it locally when the pre-PoW
//! hash changes and caches it, since derivation is the costliest step.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use shiokaze_pow::{compute_pow, generate_matrix, Hash32, Matrix, Uint256};

/// Nonces tried between running-flag and new-task checks. Bounds shutdown
/// and task-switch latency without checking per hash.
const BATCH_SIZE: u64 = 10_000;

/// A unit of work broadcast to all workers on template change.
#[derive(Debug, Clone)]
pub struct MiningTask {
    pub pre_pow_hash: Hash32,
    /// Template timestamp, held fixed through the nonce search.
    pub timestamp: u64,
    pub target: Uint256,
    pub template_id: u64,
}

/// A nonce that satisfied the target, produced at most once per find.
#[derive(Debug)]
pub struct MiningResult {
    pub worker_id: usize,
    pub nonce: u64,
    pub pow_hash: Hash32,
    pub template_id: u64,
}

/// Latest matrix keyed by pre-PoW hash, owned by one worker thread.
#[derive(Default)]
struct MatrixCache {
    entry: Option<(Hash32, Box<Matrix>)>,
}

impl MatrixCache {
    fn get(&mut self, pre_pow_hash: &Hash32) -> &Matrix {
        let stale = self
            .entry
            .as_ref()
            .map_or(true, |(key, _)| key != pre_pow_hash);
        if stale {
            self.entry = Some((*pre_pow_hash, Box::new(generate_matrix(pre_pow_hash))));
        }
        let (_, matrix) = self.entry.as_ref().expect("entry populated above");
        matrix
    }
}

/// A mining worker running in its own named thread.
pub struct MiningWorker {
    id: usize,
    handle: Option<JoinHandle<()>>,
    hash_count: Arc<AtomicU64>,
}

impl MiningWorker {
    fn spawn(
        id: usize,
        num_workers: usize,
        random_nonce: bool,
        task_rx: watch::Receiver<Option<MiningTask>>,
        result_tx: mpsc::Sender<MiningResult>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let hash_count = Arc::new(AtomicU64::new(0));
        let hash_count_clone = Arc::clone(&hash_count);

        let handle = thread::Builder::new()
            .name(format!("miner-worker-{id}"))
            .spawn(move || {
                worker_loop(
                    id,
                    num_workers,
                    random_nonce,
                    task_rx,
                    result_tx,
                    running,
                    hash_count_clone,
                );
            })
            .expect("failed to spawn mining worker thread");

        debug!(worker_id = id, "mining worker spawned");

        Self {
            id,
            handle: Some(handle),
            hash_count,
        }
    }

    fn reset_hash_count(&self) -> u64 {
        self.hash_count.swap(0, Ordering::Relaxed)
    }

    fn join_until(mut self, deadline: Instant) {
        if let Some(handle) = self.handle.take() {
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!(worker_id = self.id, "worker did not stop in time, detaching");
            }
        }
    }
}

/// Sequential-policy slice of the nonce space owned by one worker, as
/// (start, width). Workers start a small random distance into their slice.
fn nonce_partition(id: usize, num_workers: usize) -> (u64, u64) {
    let width = u64::MAX / num_workers.max(1) as u64;
    (id as u64 * width, width)
}

fn worker_loop(
    id: usize,
    num_workers: usize,
    random_nonce: bool,
    mut task_rx: watch::Receiver<Option<MiningTask>>,
    result_tx: mpsc::Sender<MiningResult>,
    running: Arc<AtomicBool>,
    hash_count: Arc<AtomicU64>,
) {
    let mut cache = MatrixCache::default();
    let mut rng = rand::thread_rng();

    let (partition_start, partition_width) = nonce_partition(id, num_workers);

    while running.load(Ordering::Relaxed) {
        let task = task_rx.borrow_and_update().clone();
        let Some(task) = task else {
            trace!(worker_id = id, "no task published yet");
            thread::sleep(Duration::from_millis(100));
            continue;
        };

        let matrix = cache.get(&task.pre_pow_hash);
        let mut nonce = if random_nonce {
            rng.gen()
        } else {
            partition_start.wrapping_add(rng.gen_range(0..(partition_width / 1_000).max(1)))
        };

        loop {
            if !running.load(Ordering::Relaxed) {
                break;
            }
            match task_rx.has_changed() {
                Ok(true) => {
                    trace!(worker_id = id, "new task available, switching");
                    break;
                }
                Ok(false) => {}
                // Publisher gone; the miner is shutting down.
                Err(_) => return,
            }

            for _ in 0..BATCH_SIZE {
                let pow_hash = compute_pow(matrix, &task.pre_pow_hash, task.timestamp, nonce);
                if Uint256::from_le_bytes(&pow_hash) < task.target {
                    info!(
                        worker_id = id,
                        nonce,
                        template_id = task.template_id,
                        "nonce satisfies target"
                    );
                    let found = MiningResult {
                        worker_id: id,
                        nonce,
                        pow_hash,
                        template_id: task.template_id,
                    };
                    if result_tx.blocking_send(found).is_err() {
                        warn!(worker_id = id, "result channel closed");
                        return;
                    }
                    // Keep mining: the template may still be current and
                    // other nonces are just as valid.
                }
                nonce = if random_nonce {
                    rng.gen()
                } else {
                    nonce.wrapping_add(1)
                };
            }
            hash_count.fetch_add(BATCH_SIZE, Ordering::Relaxed);
        }
    }

    debug!(worker_id = id, "worker shutting down");
}

/// A pool of hashing workers sharing one task broadcast and one result
/// queue.
pub struct WorkerPool {
    workers: Vec<MiningWorker>,
    task_tx: watch::Sender<Option<MiningTask>>,
    result_rx: mpsc::Receiver<MiningResult>,
    running: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(num_workers: usize, random_nonce: bool, running: Arc<AtomicBool>) -> Self {
        let (task_tx, task_rx) = watch::channel(None);
        let (result_tx, result_rx) = mpsc::channel(num_workers.max(1) * 4);

        let workers = (0..num_workers)
            .map(|id| {
                MiningWorker::spawn(
                    id,
                    num_workers,
                    random_nonce,
                    task_rx.clone(),
                    result_tx.clone(),
                    Arc::clone(&running),
                )
            })
            .collect();

        info!(num_workers, "worker pool started");

        Self {
            workers,
            task_tx,
            result_rx,
            running,
        }
    }

    /// Broadcast a new task; workers pick it up at their next batch
    /// boundary.
    pub fn publish(&self, task: MiningTask) {
        if self.task_tx.send(Some(task)).is_err() {
            warn!("no workers subscribed to task channel");
        }
    }

    pub fn try_recv_result(&mut self) -> Option<MiningResult> {
        self.result_rx.try_recv().ok()
    }

    /// Swap all per-worker counters to zero and return their sum.
    pub fn reset_hash_counts(&self) -> u64 {
        self.workers.iter().map(|w| w.reset_hash_count()).sum()
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Stop all workers and join them, detaching any straggler still
    /// inside a batch at the deadline.
    pub fn shutdown(self, timeout: Duration) {
        let WorkerPool {
            workers,
            task_tx,
            result_rx,
            running,
        } = self;
        running.store(false, Ordering::Relaxed);
        drop(task_tx);
        drop(result_rx);

        let deadline = Instant::now() + timeout;
        for worker in workers {
            worker.join_until(deadline);
        }
        info!("worker pool stopped");
    }
}
