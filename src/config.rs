/// configuration for connections, the loopback service, workloads and logging
///
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5050;
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionOptions,
    pub server: ServerConfig,
    pub workloads: WorkloadDefaults,
    pub logging: LogConfig,
}

impl Config {
    /// read the json config file
    pub fn load(path: &Path) -> Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        Config::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Config> {
        let config: Config = serde_json::from_str(text)?;
        Ok(config)
    }

    /// load from the path if one was given, otherwise use the defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Config::load(path),
            None => Ok(Config::default()),
        }
    }
}

/// where and how long to wait for the cache service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionOptions {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
}

impl ConnectionOptions {
    pub fn new(host: &str, port: u16, timeout_ms: u64) -> ConnectionOptions {
        ConnectionOptions {
            host: host.to_string(),
            port,
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT_MS)
    }
}

/// settings for the in-process loopback cache service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// evict the oldest entry once the store holds this many
    pub max_entries: Option<usize>,
    pub sweep_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_entries: None,
            sweep_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerShape {
    pub workers: usize,
    pub ops_per_worker: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadDefaults {
    pub benchmark_iterations: usize,
    pub benchmark_parallelism: usize,
    pub writers: WorkerShape,
    pub readers: WorkerShape,
    pub mixed: WorkerShape,
    pub rapid_fire_ops: usize,
    pub expiration_ttls: Vec<u64>,
}

impl Default for WorkloadDefaults {
    fn default() -> Self {
        WorkloadDefaults {
            benchmark_iterations: 1000,
            benchmark_parallelism: 1,
            writers: WorkerShape {
                workers: 10,
                ops_per_worker: 100,
            },
            readers: WorkerShape {
                workers: 20,
                ops_per_worker: 500,
            },
            mixed: WorkerShape {
                workers: 15,
                ops_per_worker: 200,
            },
            rapid_fire_ops: 5000,
            expiration_ttls: vec![3, 5, 10],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// one of off, error, warn, info, debug, trace
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 5050);
        assert_eq!(config.connection.timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.endpoint(), "localhost:5050");
        assert_eq!(config.workloads.writers.workers, 10);
        assert_eq!(config.workloads.readers.ops_per_worker, 500);
        assert_eq!(config.workloads.expiration_ttls, vec![3, 5, 10]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_json() {
        let text = r#"{ "connection": { "port": 6060 }, "workloads": { "rapid_fire_ops": 300 } }"#;
        let config = Config::parse(text).expect("should parse a partial config");
        assert_eq!(config.connection.port, 6060);
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.workloads.rapid_fire_ops, 300);
        assert_eq!(config.workloads.benchmark_iterations, 1000);
    }

    #[test]
    fn bad_json() {
        assert!(Config::parse("{ not json").is_err());
        assert!(Config::load(Path::new("/no/such/config.json")).is_err());
    }
}
