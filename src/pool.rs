/// A fixed group of worker tasks joined as a barrier, plus the race-free counters
/// they share.
///
use crate::error::CacheError;
use crate::run::{OpKind, ReadStats, RunResult};
use async_std::task::{self, JoinHandle};
use log::*;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// spawn `count` workers on the shared executor; each gets its worker index
    pub fn spawn<F, Fut>(count: usize, worker: F) -> WorkerPool
    where
        F: Fn(usize) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handles = (0..count).map(|t| task::spawn(worker(t))).collect();
        debug!("spawned {} workers", count);

        WorkerPool { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// wait for every worker to return
    pub async fn join_all(self) {
        for handle in self.handles {
            handle.await;
        }
    }
}

/// Shared tallies for one run.  Workers only ever increment.
#[derive(Debug, Default)]
pub struct Counters {
    by_kind: [AtomicU64; 4],
    errors: AtomicU64,
    disconnects: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    pub fn new() -> Arc<Counters> {
        Arc::new(Counters::default())
    }

    pub fn completed(&self, kind: OpKind) {
        self.by_kind[kind.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// count a failed operation; connection failures are also tallied on their own
    pub fn failed(&self, err: &CacheError) {
        self.error();
        if !err.is_fault() {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed_count(&self, kind: OpKind) -> u64 {
        self.by_kind[kind.index()].load(Ordering::Acquire)
    }

    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Acquire)
    }

    pub fn disconnect_count(&self) -> u64 {
        self.disconnects.load(Ordering::Acquire)
    }

    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Acquire)
    }

    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Acquire)
    }

    /// Freeze the tallies into a result.  Only call after the workers have joined.
    pub fn to_result(&self, name: &str, total_attempted: u64, elapsed: Duration) -> RunResult {
        let completed_by_kind: BTreeMap<OpKind, u64> = OpKind::ALL
            .iter()
            .map(|kind| (*kind, self.completed_count(*kind)))
            .filter(|(_, count)| *count > 0)
            .collect();

        let disconnects = self.disconnect_count();
        if disconnects > 0 {
            warn!("{}: {} operations failed on a lost connection", name, disconnects);
        }

        let (hits, misses) = (self.hit_count(), self.miss_count());
        let reads = if hits + misses > 0 {
            Some(ReadStats { hits, misses })
        } else {
            None
        };

        RunResult {
            name: name.to_string(),
            total_attempted,
            completed_by_kind,
            error_count: self.error_count(),
            elapsed,
            reads,
        }
    }
}
