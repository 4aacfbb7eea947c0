use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identifies the sensor that produced the logs. Namespaced network IDs
    /// are derived from it; the zero UUID is used when absent.
    #[serde(default)]
    pub sensor_uuid: Option<Uuid>,
    #[serde(default)]
    pub filtering: FilterConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    pub fn sensor_uuid(&self) -> Uuid {
        self.sensor_uuid.unwrap_or_else(Uuid::nil)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_internal_subnets")]
    pub internal_subnets: Vec<IpNet>,
    #[serde(default)]
    pub always_include_subnets: Vec<IpNet>,
    #[serde(default)]
    pub never_include_subnets: Vec<IpNet>,
    #[serde(default)]
    pub always_include_domains: Vec<String>,
    #[serde(default)]
    pub never_include_domains: Vec<String>,
    #[serde(default)]
    pub filter_external_to_internal: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            internal_subnets: default_internal_subnets(),
            always_include_subnets: Vec::new(),
            never_include_subnets: Vec::new(),
            always_include_domains: Vec::new(),
            never_include_domains: Vec::new(),
            filter_external_to_internal: false,
        }
    }
}

fn default_internal_subnets() -> Vec<IpNet> {
    // RFC 1918 plus loopback and link-local
    [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "fe80::/10",
        "::1/128",
    ]
    .iter()
    .map(|s| s.parse().expect("static subnet literal"))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Rolling databases keep only the most recent N days of logs.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Per-UID cap on HTTP requests promoted into the final table.
    #[serde(default = "default_http_requests_per_uid")]
    pub http_requests_per_uid: u32,
    /// Writer flushes per second (token bucket, burst = same value).
    #[serde(default = "default_writer_rate_limit")]
    pub writer_rate_limit: u32,
    /// Rows per writer batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker count per pool; 0 selects max(4, N_cpu/2).
    #[serde(default)]
    pub workers: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            http_requests_per_uid: default_http_requests_per_uid(),
            writer_rate_limit: default_writer_rate_limit(),
            batch_size: default_batch_size(),
            workers: 0,
        }
    }
}

impl ImportConfig {
    /// Effective worker count for digester, parser, and writer pools.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus / 2).max(4)
    }
}

fn default_retention_days() -> u32 {
    15
}

fn default_http_requests_per_uid() -> u32 {
    20
}

fn default_writer_rate_limit() -> u32 {
    5
}

fn default_batch_size() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("stakeout.duckdb")
}
