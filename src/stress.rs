/// Concurrent load scenarios.
///
/// Every scenario counts each operation exactly once, as completed (by kind) or
/// as an error, and never stops early on a fault.  Throughput covers the worker
/// phase only; pre-population and cleanup run outside the measured window, and
/// cleanup never starts before every worker has joined.
///
use crate::client::CacheHandle;
use crate::config::WorkloadDefaults;
use crate::model::Product;
use crate::pool::{Counters, WorkerPool};
use crate::run::{OpKind, ReadStats, RunResult, WorkloadSpec};
use log::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

pub const WRITER_NAMESPACE: &str = "stress:writer";
pub const READER_NAMESPACE: &str = "stress:read";
pub const MIXED_NAMESPACE: &str = "stress:mixed";
pub const RAPID_NAMESPACE: &str = "rapid";

/// fixed key spaces for the reader, mixed and rapid-fire scenarios
pub const READER_KEYS: usize = 100;
pub const MIXED_KEYS: usize = 50;
pub const RAPID_CYCLE: usize = 100;

/// rapid-fire reports progress every this many steps
pub const PROGRESS_EVERY: usize = 500;

/// uniform mix used by the mixed scenario when the workload names none
pub const UNIFORM_MIX: [(OpKind, u32); 4] = [
    (OpKind::Add, 1),
    (OpKind::Get, 1),
    (OpKind::Update, 1),
    (OpKind::Remove, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    ConcurrentWriters,
    ConcurrentReaders,
    MixedConcurrent,
    RapidFire,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::ConcurrentWriters,
        Scenario::ConcurrentReaders,
        Scenario::MixedConcurrent,
        Scenario::RapidFire,
    ];

    /// the scenario's workload built from the configured defaults
    pub fn default_spec(self, defaults: &WorkloadDefaults) -> WorkloadSpec {
        match self {
            Scenario::ConcurrentWriters => WorkloadSpec::new(
                WRITER_NAMESPACE,
                defaults.writers.workers,
                defaults.writers.ops_per_worker,
            ),
            Scenario::ConcurrentReaders => WorkloadSpec::new(
                READER_NAMESPACE,
                defaults.readers.workers,
                defaults.readers.ops_per_worker,
            ),
            Scenario::MixedConcurrent => WorkloadSpec::new(
                MIXED_NAMESPACE,
                defaults.mixed.workers,
                defaults.mixed.ops_per_worker,
            )
            .with_mix(&UNIFORM_MIX),
            Scenario::RapidFire => WorkloadSpec::rapid(RAPID_NAMESPACE, defaults.rapid_fire_ops),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Scenario::ConcurrentWriters => "concurrent-writers",
            Scenario::ConcurrentReaders => "concurrent-readers",
            Scenario::MixedConcurrent => "mixed-concurrent",
            Scenario::RapidFire => "rapid-fire",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RapidFireProgress {
    pub step: usize,
    pub total: usize,
    pub percent: usize,
}

/// the operation rapid-fire issues at step `i`
pub fn rapid_fire_op(i: usize) -> OpKind {
    match i % 3 {
        0 => OpKind::Add,
        1 => OpKind::Get,
        _ => OpKind::Remove,
    }
}

pub struct StressEngine;

impl StressEngine {
    /// run a scenario, logging rapid-fire progress
    pub async fn run(handle: Arc<dyn CacheHandle>, scenario: Scenario, spec: &WorkloadSpec) -> RunResult {
        StressEngine::run_with_progress(handle, scenario, spec, |p| {
            debug!("rapid fire progress: {}%", p.percent)
        })
        .await
    }

    pub async fn run_with_progress<P>(
        handle: Arc<dyn CacheHandle>,
        scenario: Scenario,
        spec: &WorkloadSpec,
        on_progress: P,
    ) -> RunResult
    where
        P: FnMut(RapidFireProgress),
    {
        info!(
            "{}: {} workers x {} ops, total {}",
            scenario, spec.worker_count, spec.ops_per_worker, spec.total_ops
        );

        let result = match scenario {
            Scenario::ConcurrentWriters => StressEngine::concurrent_writers(handle, spec).await,
            Scenario::ConcurrentReaders => StressEngine::concurrent_readers(handle, spec).await,
            Scenario::MixedConcurrent => StressEngine::mixed_concurrent(handle, spec).await,
            Scenario::RapidFire => StressEngine::rapid_fire(handle.as_ref(), spec, on_progress).await,
        };

        info!(
            "{} completed: {} of {}, errors: {}, {:.2}s, {:.2} ops/sec",
            scenario,
            result.completed(),
            result.total_attempted,
            result.error_count,
            result.elapsed.as_secs_f64(),
            result.throughput()
        );

        result
    }

    /// each worker adds `{ns}:{worker}:{i}`; the written keys are removed afterwards in parallel
    pub async fn concurrent_writers(handle: Arc<dyn CacheHandle>, spec: &WorkloadSpec) -> RunResult {
        let counters = Counters::new();
        let ops = spec.ops_per_worker;
        let namespace = spec.key_namespace.clone();

        let start = Instant::now();
        let shared = counters.clone();
        let (worker_handle, ns) = (handle.clone(), namespace.clone());
        let pool = WorkerPool::spawn(spec.worker_count, move |t| {
            let (handle, counters, ns) = (worker_handle.clone(), shared.clone(), ns.clone());
            async move {
                for i in 0..ops {
                    let key = format!("{}:{}:{}", ns, t, i);
                    let product = Product::new(
                        i as i64,
                        &format!("Stress {}-{}", t, i),
                        i as f64,
                        "Stress test",
                    );
                    match handle.add(&key, &product.to_json(), None).await {
                        Ok(()) => counters.completed(OpKind::Add),
                        Err(e) => counters.failed(&e),
                    }
                }
            }
        });
        pool.join_all().await;
        let elapsed = start.elapsed();

        let total = (spec.worker_count * ops) as u64;
        let result = counters.to_result(&Scenario::ConcurrentWriters.to_string(), total, elapsed);

        debug!("cleaning up writer keys");
        let cleanup = WorkerPool::spawn(spec.worker_count, move |t| {
            let (handle, ns) = (handle.clone(), namespace.clone());
            async move {
                for i in 0..ops {
                    let _ = handle.remove(&format!("{}:{}:{}", ns, t, i)).await;
                }
            }
        });
        cleanup.join_all().await;

        result
    }

    /// Pre-populate the fixed read key space, then each worker reads random keys from
    /// a generator seeded with its index.
    pub async fn concurrent_readers(handle: Arc<dyn CacheHandle>, spec: &WorkloadSpec) -> RunResult {
        for i in 0..READER_KEYS {
            let product = Product::new(i as i64, &format!("Read Test {}", i), i as f64, "Test");
            if let Err(e) = handle.add(&spec.key(i), &product.to_json(), None).await {
                trace!("pre-populate {} swallowed: {}", i, e);
            }
        }

        let counters = Counters::new();
        let ops = spec.ops_per_worker;
        let namespace = spec.key_namespace.clone();

        let start = Instant::now();
        let shared = counters.clone();
        let worker_handle = handle.clone();
        let pool = WorkerPool::spawn(spec.worker_count, move |t| {
            let (handle, counters, ns) = (worker_handle.clone(), shared.clone(), namespace.clone());
            async move {
                let rng = fastrand::Rng::with_seed(t as u64);
                for _ in 0..ops {
                    let key = format!("{}:{}", ns, rng.usize(..READER_KEYS));
                    match handle.get(&key).await {
                        Ok(Some(_)) => {
                            counters.hit();
                            counters.completed(OpKind::Get);
                        }
                        Ok(None) => {
                            counters.miss();
                            counters.completed(OpKind::Get);
                        }
                        Err(e) => counters.failed(&e),
                    }
                }
            }
        });
        pool.join_all().await;
        let elapsed = start.elapsed();

        let total = (spec.worker_count * ops) as u64;
        let mut result = counters.to_result(&Scenario::ConcurrentReaders.to_string(), total, elapsed);
        result.reads = Some(ReadStats {
            hits: counters.hit_count(),
            misses: counters.miss_count(),
        });

        StressEngine::remove_keyspace(handle.as_ref(), spec, READER_KEYS).await;

        result
    }

    /// each worker picks a random key from the fixed mixed key space and an operation
    /// from the workload mix (uniform when empty)
    pub async fn mixed_concurrent(handle: Arc<dyn CacheHandle>, spec: &WorkloadSpec) -> RunResult {
        let mix = if spec.operation_mix.is_empty() || spec.total_weight() == 0 {
            spec.clone().with_mix(&UNIFORM_MIX)
        } else {
            spec.clone()
        };
        let mix = Arc::new(mix);

        let counters = Counters::new();
        let ops = spec.ops_per_worker;

        let start = Instant::now();
        let shared = counters.clone();
        let worker_handle = handle.clone();
        let pool = WorkerPool::spawn(spec.worker_count, move |t| {
            let (handle, counters, mix) = (worker_handle.clone(), shared.clone(), mix.clone());
            async move {
                let rng = fastrand::Rng::with_seed(t as u64);
                let weight = mix.total_weight();
                for i in 0..ops {
                    let key = mix.key(rng.usize(..MIXED_KEYS));
                    let op = mix.pick(rng.u32(..weight)).unwrap_or(OpKind::Get);
                    let value = match op {
                        OpKind::Update => Product::new(i as i64, "Updated", (i * 2) as f64, "Updated"),
                        _ => Product::new(i as i64, "Mixed", i as f64, "Test"),
                    };
                    match op.apply(handle.as_ref(), &key, &value.to_json()).await {
                        Ok(()) => counters.completed(op),
                        Err(e) => counters.failed(&e),
                    }
                }
            }
        });
        pool.join_all().await;
        let elapsed = start.elapsed();

        let total = (spec.worker_count * ops) as u64;
        let result = counters.to_result(&Scenario::MixedConcurrent.to_string(), total, elapsed);

        StressEngine::remove_keyspace(handle.as_ref(), spec, MIXED_KEYS).await;

        result
    }

    /// Strictly sequential add/get/remove cycling over `{ns}:{i % 100}`.  There is no
    /// cleanup: a run that stops mid-cycle leaves some keys behind.
    pub async fn rapid_fire<P>(handle: &dyn CacheHandle, spec: &WorkloadSpec, mut on_progress: P) -> RunResult
    where
        P: FnMut(RapidFireProgress),
    {
        let counters = Counters::new();
        let total = spec.total_ops;

        let start = Instant::now();
        for i in 0..total {
            let key = spec.key(i % RAPID_CYCLE);
            let op = rapid_fire_op(i);
            match op.apply(handle, &key, &format!("Value {}", i)).await {
                Ok(()) => counters.completed(op),
                Err(e) => counters.failed(&e),
            }

            if i % PROGRESS_EVERY == 0 {
                on_progress(RapidFireProgress {
                    step: i,
                    total,
                    percent: i * 100 / total,
                });
            }
        }
        let elapsed = start.elapsed();

        counters.to_result(&Scenario::RapidFire.to_string(), total as u64, elapsed)
    }

    // best-effort removal of `{ns}:0..count`
    async fn remove_keyspace(handle: &dyn CacheHandle, spec: &WorkloadSpec, count: usize) {
        for i in 0..count {
            let _ = handle.remove(&spec.key(i)).await;
        }
    }
}
