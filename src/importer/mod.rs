pub mod digest;
pub mod runner;
pub mod season;

use crate::storage::StorageError;
use crate::walker::DiscoveryError;
use crate::zeek::ScanError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

pub use runner::{ChunkOutcome, ChunkReport, ChunkResult, Importer, ImportSummary};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("all files in this chunk were previously imported")]
    AllFilesPreviouslyImported,

    #[error("database '{0}' already exists; pass --rebuild or use a rolling database")]
    DatabaseExists(String),

    #[error("import cancelled")]
    Cancelled,

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A file the chunk gave up on. Non-fatal: the rest of the chunk
/// continues.
#[derive(Debug)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: ScanError,
}

/// Per-kind record counters, incremented by the normalizer workers.
#[derive(Debug, Default)]
pub struct ResultCounts {
    pub conn: AtomicU64,
    pub open_conn: AtomicU64,
    pub dns: AtomicU64,
    pub pdns: AtomicU64,
    pub http: AtomicU64,
    pub open_http: AtomicU64,
    pub ssl: AtomicU64,
    pub open_ssl: AtomicU64,
}

impl ResultCounts {
    pub fn snapshot(&self) -> CountsSnapshot {
        CountsSnapshot {
            conn: self.conn.load(Ordering::Relaxed),
            open_conn: self.open_conn.load(Ordering::Relaxed),
            dns: self.dns.load(Ordering::Relaxed),
            pdns: self.pdns.load(Ordering::Relaxed),
            http: self.http.load(Ordering::Relaxed),
            open_http: self.open_http.load(Ordering::Relaxed),
            ssl: self.ssl.load(Ordering::Relaxed),
            open_ssl: self.open_ssl.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountsSnapshot {
    pub conn: u64,
    pub open_conn: u64,
    pub dns: u64,
    pub pdns: u64,
    pub http: u64,
    pub open_http: u64,
    pub ssl: u64,
    pub open_ssl: u64,
}

impl CountsSnapshot {
    pub fn total(&self) -> u64 {
        self.conn
            + self.open_conn
            + self.dns
            + self.pdns
            + self.http
            + self.open_http
            + self.ssl
            + self.open_ssl
    }
}
