/// Raw throughput measurement of a single operation kind.
///
/// Write, read and update steps map step `i` to `perf:write:{i}` so the read and
/// update phases see what the write phase planted.  Step faults are swallowed:
/// only successful steps are tallied, there is no error counter here.
///
use crate::client::CacheHandle;
use crate::model::Product;
use crate::pool::{Counters, WorkerPool};
use crate::run::{OpKind, RunResult};
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

pub const WRITE_NAMESPACE: &str = "perf:write";
pub const MIXED_NAMESPACE: &str = "perf:mixed";
pub const DEFAULT_ITERATIONS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkKind {
    Write,
    Read,
    Update,
    Mixed,
}

impl BenchmarkKind {
    pub const SUITE: [BenchmarkKind; 4] = [
        BenchmarkKind::Write,
        BenchmarkKind::Read,
        BenchmarkKind::Update,
        BenchmarkKind::Mixed,
    ];
}

impl fmt::Display for BenchmarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BenchmarkKind::Write => "WRITE",
            BenchmarkKind::Read => "READ",
            BenchmarkKind::Update => "UPDATE",
            BenchmarkKind::Mixed => "MIXED",
        };
        write!(f, "{}", label)
    }
}

/// the operation, key and payload for one step
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub op: OpKind,
    pub key: String,
    pub value: String,
}

/// Plan step `i`.  Only the mixed kind consumes the rng: one draw for the target
/// index and one for the operation.
pub fn plan_step(kind: BenchmarkKind, i: usize, iterations: usize, rng: &fastrand::Rng) -> Step {
    let target = i % iterations.max(1);
    match kind {
        BenchmarkKind::Write => Step {
            op: OpKind::Add,
            key: format!("{}:{}", WRITE_NAMESPACE, target),
            value: Product::new(i as i64, &format!("Perf Test {}", i), i as f64, "Benchmark").to_json(),
        },
        BenchmarkKind::Read => Step {
            op: OpKind::Get,
            key: format!("{}:{}", WRITE_NAMESPACE, target),
            value: String::new(),
        },
        BenchmarkKind::Update => Step {
            op: OpKind::Update,
            key: format!("{}:{}", WRITE_NAMESPACE, target),
            value: Product::new(i as i64, &format!("Updated {}", i), (i * 2) as f64, "Updated").to_json(),
        },
        BenchmarkKind::Mixed => {
            let index = rng.usize(..iterations.max(1));
            match rng.usize(..3) {
                0 => Step {
                    op: OpKind::Add,
                    key: format!("{}:{}", MIXED_NAMESPACE, i),
                    value: Product::new(i as i64, "Mixed", i as f64, "Test").to_json(),
                },
                1 => Step {
                    op: OpKind::Get,
                    key: format!("{}:{}", WRITE_NAMESPACE, index),
                    value: String::new(),
                },
                _ => Step {
                    op: OpKind::Update,
                    key: format!("{}:{}", WRITE_NAMESPACE, index),
                    value: Product::new(i as i64, "Mixed Update", i as f64, "Test").to_json(),
                },
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkEngine {
    parallelism: usize,
}

impl Default for BenchmarkEngine {
    fn default() -> Self {
        BenchmarkEngine::new(1)
    }
}

impl BenchmarkEngine {
    /// `parallelism` workers split the steps round-robin; 1 runs them strictly in order
    pub fn new(parallelism: usize) -> BenchmarkEngine {
        BenchmarkEngine {
            parallelism: parallelism.max(1),
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// run `iterations` steps of one kind; elapsed covers the measured loop only
    pub async fn run(
        &self,
        handle: Arc<dyn CacheHandle>,
        kind: BenchmarkKind,
        iterations: usize,
    ) -> RunResult {
        let counters = Counters::new();
        let workers = self.parallelism.min(iterations.max(1));

        info!("{} benchmark, {} iterations on {} workers", kind, iterations, workers);

        let shared = counters.clone();
        let start = Instant::now();
        let pool = WorkerPool::spawn(workers, move |w| {
            let handle = handle.clone();
            let counters = shared.clone();
            async move {
                let rng = fastrand::Rng::new();
                for i in (w..iterations).step_by(workers) {
                    let step = plan_step(kind, i, iterations, &rng);
                    match step.op.apply(handle.as_ref(), &step.key, &step.value).await {
                        Ok(()) => counters.completed(step.op),
                        Err(e) => trace!("{} step {} swallowed: {}", kind, i, e),
                    }
                }
            }
        });
        pool.join_all().await;
        let elapsed = start.elapsed();

        let result = counters.to_result(&kind.to_string(), iterations as u64, elapsed);
        info!(
            "{} done in {:.2}ms, {:.2} ops/sec",
            kind,
            elapsed.as_secs_f64() * 1000.0,
            result.throughput()
        );

        result
    }

    /// Remove every key a run of `iterations` steps may have created.  Missing keys
    /// and faults are ignored.
    pub async fn cleanup(handle: &dyn CacheHandle, iterations: usize) {
        let mut removed = 0usize;
        for i in 0..iterations {
            for ns in [WRITE_NAMESPACE, MIXED_NAMESPACE] {
                if handle.remove(&format!("{}:{}", ns, i)).await.is_ok() {
                    removed += 1;
                }
            }
        }
        debug!("benchmark cleanup removed {} keys", removed);
    }

    /// write, read, update and mixed phases in order, then one cleanup pass
    pub async fn run_suite(&self, handle: Arc<dyn CacheHandle>, iterations: usize) -> Vec<RunResult> {
        let iterations = if iterations == 0 {
            DEFAULT_ITERATIONS
        } else {
            iterations
        };

        let mut results = Vec::with_capacity(BenchmarkKind::SUITE.len());
        for kind in BenchmarkKind::SUITE {
            results.push(self.run(handle.clone(), kind, iterations).await);
        }

        BenchmarkEngine::cleanup(handle.as_ref(), iterations).await;

        results
    }
}
