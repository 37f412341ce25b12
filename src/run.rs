/// workload configuration and the aggregate result of one run
///
use crate::client::CacheHandle;
use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// the cache operations a run can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpKind {
    Add,
    Get,
    Update,
    Remove,
}

impl OpKind {
    pub const ALL: [OpKind; 4] = [OpKind::Add, OpKind::Get, OpKind::Update, OpKind::Remove];

    pub fn index(self) -> usize {
        match self {
            OpKind::Add => 0,
            OpKind::Get => 1,
            OpKind::Update => 2,
            OpKind::Remove => 3,
        }
    }
}

impl OpKind {
    /// issue this operation; a read's value is discarded
    pub async fn apply(
        self,
        handle: &dyn CacheHandle,
        key: &str,
        value: &str,
    ) -> Result<(), CacheError> {
        match self {
            OpKind::Add => handle.add(key, value, None).await,
            OpKind::Get => handle.get(key).await.map(|_| ()),
            OpKind::Update => handle.update(key, value).await,
            OpKind::Remove => handle.remove(key).await,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OpKind::Add => "add",
            OpKind::Get => "get",
            OpKind::Update => "update",
            OpKind::Remove => "remove",
        };
        write!(f, "{}", label)
    }
}

/// Shape of a benchmark or stress run; fixed once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub worker_count: usize,
    pub ops_per_worker: usize,
    /// only used by the sequential rapid-fire scenario
    pub total_ops: usize,
    pub key_namespace: String,
    /// eligible operations and their relative weights
    pub operation_mix: Vec<(OpKind, u32)>,
}

impl WorkloadSpec {
    pub fn new(namespace: &str, worker_count: usize, ops_per_worker: usize) -> WorkloadSpec {
        WorkloadSpec {
            worker_count,
            ops_per_worker,
            total_ops: worker_count * ops_per_worker,
            key_namespace: namespace.to_string(),
            operation_mix: vec![],
        }
    }

    pub fn rapid(namespace: &str, total_ops: usize) -> WorkloadSpec {
        WorkloadSpec {
            worker_count: 1,
            ops_per_worker: total_ops,
            total_ops,
            key_namespace: namespace.to_string(),
            operation_mix: vec![],
        }
    }

    pub fn with_mix(mut self, mix: &[(OpKind, u32)]) -> WorkloadSpec {
        self.operation_mix = mix.to_vec();
        self
    }

    /// the key `{namespace}:{suffix}`
    pub fn key(&self, suffix: impl fmt::Display) -> String {
        format!("{}:{}", self.key_namespace, suffix)
    }

    /// pick an operation by weight from a roll in `[0, total_weight)`; None for an empty mix
    pub fn pick(&self, roll: u32) -> Option<OpKind> {
        let mut remaining = roll;
        for (kind, weight) in self.operation_mix.iter() {
            if remaining < *weight {
                return Some(*kind);
            }
            remaining -= weight;
        }
        None
    }

    pub fn total_weight(&self) -> u32 {
        self.operation_mix.iter().map(|(_, w)| *w).sum()
    }
}

/// cache hit statistics for read-heavy scenarios
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadStats {
    pub hits: u64,
    pub misses: u64,
}

/// The outcome of one run.  Built once after every worker has joined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub name: String,
    pub total_attempted: u64,
    pub completed_by_kind: BTreeMap<OpKind, u64>,
    pub error_count: u64,
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reads: Option<ReadStats>,
}

impl RunResult {
    pub fn completed(&self) -> u64 {
        self.completed_by_kind.values().sum()
    }

    pub fn completed_for(&self, kind: OpKind) -> u64 {
        self.completed_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// ops per second over the measured phase; infinite when no measurable time passed
    pub fn throughput(&self) -> f64 {
        throughput(self.total_attempted, self.elapsed)
    }

    /// average latency per attempted op in milliseconds
    pub fn average_ms(&self) -> f64 {
        if self.total_attempted == 0 {
            return 0.0;
        }
        self.elapsed.as_secs_f64() * 1000.0 / self.total_attempted as f64
    }

    /// json report line
    pub fn to_json(&self) -> String {
        let by_kind: BTreeMap<String, u64> = self
            .completed_by_kind
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();

        let ops_per_sec = self.throughput();
        let throughput = if ops_per_sec.is_finite() {
            serde_json::json!(ops_per_sec)
        } else {
            serde_json::json!("unbounded")
        };

        let report = serde_json::json!({
            "name": self.name,
            "total": self.total_attempted,
            "completed": self.completed(),
            "errors": self.error_count,
            "by_kind": by_kind,
            "reads": self.reads,
            "duration_secs": self.elapsed.as_secs_f64(),
            "throughput": throughput,
            "avg_ms": self.average_ms(),
        });
        report.to_string()
    }
}

pub fn throughput(ops: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= f64::EPSILON {
        return f64::INFINITY;
    }
    ops as f64 / secs
}
