pub mod hour;
pub mod retention;
pub mod walk;

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;

pub use hour::{parse_day_from_folder, parse_hour_from_filename, HourParseError};
pub use walk::{discover, Discovery, DiscoveryError};

/// The seven Zeek log kinds the importer understands. Open variants report
/// connections still in flight at the sensor's rotation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogKind {
    Conn,
    OpenConn,
    Dns,
    Http,
    OpenHttp,
    Ssl,
    OpenSsl,
}

impl LogKind {
    /// Load-order used when feeding paths to the digesters.
    pub const ALL: [LogKind; 7] = [
        LogKind::Conn,
        LogKind::Http,
        LogKind::Ssl,
        LogKind::OpenConn,
        LogKind::OpenHttp,
        LogKind::OpenSsl,
        LogKind::Dns,
    ];

    pub fn prefix(self) -> &'static str {
        match self {
            LogKind::Conn => "conn",
            LogKind::OpenConn => "open_conn",
            LogKind::Dns => "dns",
            LogKind::Http => "http",
            LogKind::OpenHttp => "open_http",
            LogKind::Ssl => "ssl",
            LogKind::OpenSsl => "open_ssl",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(
            self,
            LogKind::OpenConn | LogKind::OpenHttp | LogKind::OpenSsl
        )
    }

    /// Classify a file basename by longest matching log prefix.
    pub fn from_basename(name: &str) -> Option<LogKind> {
        // conn_summary logs look like conn logs but are a different product
        if name.starts_with("conn_summary") || name.starts_with("conn-summary") {
            return None;
        }
        // Longest prefixes first so open_conn does not classify as conn
        const ORDERED: [LogKind; 7] = [
            LogKind::OpenConn,
            LogKind::OpenHttp,
            LogKind::OpenSsl,
            LogKind::Conn,
            LogKind::Http,
            LogKind::Ssl,
            LogKind::Dns,
        ];
        ORDERED
            .into_iter()
            .find(|kind| name.starts_with(kind.prefix()))
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.prefix())
    }
}

/// One accepted log file, classified and ready for the paths queue.
#[derive(Debug, Clone)]
pub struct LogFile {
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub kind: LogKind,
    pub day: NaiveDate,
    pub hour: u8,
    /// 128-bit hex hash keying this file in the catalog.
    pub hash: String,
}

/// Per-file classification failure. Non-fatal unless nothing survives.
#[derive(Debug, Clone)]
pub struct WalkError {
    pub path: PathBuf,
    pub kind: WalkErrorKind,
}

#[derive(Debug, Clone, Error)]
pub enum WalkErrorKind {
    #[error("unreadable file: {0}")]
    UnreadableFile(String),

    #[error("incompatible extension (expected .log or .log.gz)")]
    IncompatibleExtension,

    #[error("invalid log prefix")]
    InvalidLogPrefix,

    #[error("unparseable hour: {0}")]
    UnparseableHour(HourParseError),

    #[error("skipped duplicate (newer twin exists)")]
    SkippedDuplicate,
}

/// Files for one hour of one day, grouped by log kind, paths sorted.
#[derive(Debug, Clone, Default)]
pub struct HourBucket {
    pub by_kind: BTreeMap<LogKind, Vec<LogFile>>,
}

impl HourBucket {
    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(|v| v.is_empty())
    }

    pub fn file_count(&self) -> usize {
        self.by_kind.values().map(|v| v.len()).sum()
    }

    /// Files in digester feed order.
    pub fn files_in_feed_order(&self) -> Vec<LogFile> {
        let mut out = Vec::with_capacity(self.file_count());
        for kind in LogKind::ALL {
            if let Some(files) = self.by_kind.get(&kind) {
                out.extend(files.iter().cloned());
            }
        }
        out
    }
}

/// One logical day: 24 hour buckets, empty hours preserved.
#[derive(Debug, Clone)]
pub struct DayPlan {
    pub day: NaiveDate,
    pub hours: Vec<HourBucket>,
}

impl DayPlan {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            hours: vec![HourBucket::default(); 24],
        }
    }
}

/// The full ingest plan: days ascending, each with 24 hour buckets.
#[derive(Debug, Clone, Default)]
pub struct IngestPlan {
    pub days: Vec<DayPlan>,
}

impl IngestPlan {
    pub fn day_mut(&mut self, day: NaiveDate) -> &mut DayPlan {
        match self.days.binary_search_by_key(&day, |d| d.day) {
            Ok(idx) => &mut self.days[idx],
            Err(idx) => {
                self.days.insert(idx, DayPlan::new(day));
                &mut self.days[idx]
            }
        }
    }

    pub fn file_count(&self) -> usize {
        self.days
            .iter()
            .flat_map(|d| d.hours.iter())
            .map(|h| h.file_count())
            .sum()
    }
}
