//! Worker pools for the parse half of the pipeline: digesters pull paths
//! off the bounded queue and scan files into typed record channels; the
//! normalizer pools drain those channels into the per-table writers.

use super::{FileFailure, ResultCounts};
use crate::normalize::entries::{ConnEntry, DnsEntry, HttpEntry, PdnsEntry, SslEntry};
use crate::normalize::Normalizer;
use crate::walker::{LogFile, LogKind};
use crate::zeek::records::{ConnRecord, DnsRecord, HttpRecord, SslRecord};
use crate::zeek::{ScanError, Scanner, ZeekRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const PATHS_QUEUE_CAPACITY: usize = 10;
pub const RECORD_CHANNEL_CAPACITY: usize = 1000;
pub const ERROR_CHANNEL_CAPACITY: usize = 100;
pub const META_CHANNEL_CAPACITY: usize = 1000;

/// Sent to the metadata consumer once a file's header parses.
#[derive(Debug, Clone)]
pub struct FileAccepted {
    pub hash: String,
    pub path: String,
}

/// One sender per record kind, cloned into each digester.
#[derive(Clone)]
pub struct RecordSenders {
    pub conn: mpsc::Sender<ConnRecord>,
    pub open_conn: mpsc::Sender<ConnRecord>,
    pub dns: mpsc::Sender<DnsRecord>,
    pub http: mpsc::Sender<HttpRecord>,
    pub open_http: mpsc::Sender<HttpRecord>,
    pub ssl: mpsc::Sender<SslRecord>,
    pub open_ssl: mpsc::Sender<SslRecord>,
}

type SharedReceiver<T> = Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>;

fn shared<T>(rx: mpsc::Receiver<T>) -> SharedReceiver<T> {
    Arc::new(tokio::sync::Mutex::new(rx))
}

/// Spawn the digester pool. Each worker pops a path, parses the header,
/// reports acceptance, and streams typed records onto the kind's channel.
/// Cancellation is checked between files only; an in-flight file finishes.
pub fn spawn_digesters(
    workers: usize,
    paths_rx: mpsc::Receiver<LogFile>,
    senders: RecordSenders,
    meta_tx: mpsc::Sender<FileAccepted>,
    failure_tx: mpsc::Sender<FileFailure>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let paths = shared(paths_rx);
    (0..workers.max(1))
        .map(|worker| {
            let paths = paths.clone();
            let senders = senders.clone();
            let meta_tx = meta_tx.clone();
            let failure_tx = failure_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker, "digester stopping on cancellation");
                        return;
                    }
                    let Some(file) = ({ paths.lock().await.recv().await }) else {
                        return;
                    };
                    let outcome = match file.kind {
                        LogKind::Conn => digest_file(&file, &senders.conn, &meta_tx).await,
                        LogKind::OpenConn => {
                            digest_file(&file, &senders.open_conn, &meta_tx).await
                        }
                        LogKind::Dns => digest_file(&file, &senders.dns, &meta_tx).await,
                        LogKind::Http => digest_file(&file, &senders.http, &meta_tx).await,
                        LogKind::OpenHttp => {
                            digest_file(&file, &senders.open_http, &meta_tx).await
                        }
                        LogKind::Ssl => digest_file(&file, &senders.ssl, &meta_tx).await,
                        LogKind::OpenSsl => {
                            digest_file(&file, &senders.open_ssl, &meta_tx).await
                        }
                    };
                    match outcome {
                        Ok(records) => {
                            debug!(path = %file.path.display(), records, "file digested");
                        }
                        Err(error) => {
                            warn!(path = %file.path.display(), %error, "file abandoned");
                            let _ = failure_tx
                                .send(FileFailure {
                                    path: file.path.clone(),
                                    error,
                                })
                                .await;
                        }
                    }
                }
            })
        })
        .collect()
}

async fn digest_file<R: ZeekRecord>(
    file: &LogFile,
    tx: &mpsc::Sender<R>,
    meta_tx: &mpsc::Sender<FileAccepted>,
) -> Result<u64, ScanError> {
    let mut scanner: Scanner<R> = Scanner::open(&file.path)?;

    if !scanner.header().path_matches(file.kind.prefix()) {
        warn!(
            path = %file.path.display(),
            directive = scanner.header().path.as_deref().unwrap_or(""),
            expected = file.kind.prefix(),
            "header path directive disagrees with filename prefix"
        );
    }

    // Header detected: the file counts as accepted even if parsing stops
    // early, so a re-import can skip it.
    let _ = meta_tx
        .send(FileAccepted {
            hash: file.hash.clone(),
            path: file.path.display().to_string(),
        })
        .await;

    let mut records = 0;
    loop {
        match scanner.next_record() {
            Ok(Some(record)) => {
                if tx.send(record).await.is_err() {
                    return Ok(records);
                }
                records += 1;
            }
            Ok(None) => return Ok(records),
            Err(error) => return Err(error),
        }
    }
}

type CounterFn = for<'a> fn(&'a ResultCounts) -> &'a AtomicU64;

/// Conn-record normalizer pool; serves both `conn` and `open_conn` with
/// different writer targets and counters.
pub fn spawn_conn_pool(
    workers: usize,
    rx: mpsc::Receiver<ConnRecord>,
    normalizer: Arc<Normalizer>,
    tx: mpsc::Sender<ConnEntry>,
    counts: Arc<ResultCounts>,
    counter: CounterFn,
) -> Vec<JoinHandle<()>> {
    let rx = shared(rx);
    (0..workers.max(1))
        .map(|_| {
            let rx = rx.clone();
            let normalizer = normalizer.clone();
            let tx = tx.clone();
            let counts = counts.clone();
            tokio::spawn(async move {
                loop {
                    let Some(record) = ({ rx.lock().await.recv().await }) else {
                        return;
                    };
                    if let Some(entry) = normalizer.conn(record) {
                        counter(&counts).fetch_add(1, Ordering::Relaxed);
                        if tx.send(entry).await.is_err() {
                            return;
                        }
                    }
                }
            })
        })
        .collect()
}

/// DNS normalizer pool: one entry per record plus expanded passive-DNS
/// rows.
pub fn spawn_dns_pool(
    workers: usize,
    rx: mpsc::Receiver<DnsRecord>,
    normalizer: Arc<Normalizer>,
    dns_tx: mpsc::Sender<DnsEntry>,
    pdns_tx: mpsc::Sender<PdnsEntry>,
    counts: Arc<ResultCounts>,
) -> Vec<JoinHandle<()>> {
    let rx = shared(rx);
    (0..workers.max(1))
        .map(|_| {
            let rx = rx.clone();
            let normalizer = normalizer.clone();
            let dns_tx = dns_tx.clone();
            let pdns_tx = pdns_tx.clone();
            let counts = counts.clone();
            tokio::spawn(async move {
                loop {
                    let Some(record) = ({ rx.lock().await.recv().await }) else {
                        return;
                    };
                    if let Some((entry, pdns)) = normalizer.dns(record) {
                        counts.dns.fetch_add(1, Ordering::Relaxed);
                        if dns_tx.send(entry).await.is_err() {
                            return;
                        }
                        for row in pdns {
                            counts.pdns.fetch_add(1, Ordering::Relaxed);
                            if pdns_tx.send(row).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            })
        })
        .collect()
}

pub fn spawn_http_pool(
    workers: usize,
    rx: mpsc::Receiver<HttpRecord>,
    normalizer: Arc<Normalizer>,
    tx: mpsc::Sender<HttpEntry>,
    counts: Arc<ResultCounts>,
    counter: CounterFn,
) -> Vec<JoinHandle<()>> {
    let rx = shared(rx);
    (0..workers.max(1))
        .map(|_| {
            let rx = rx.clone();
            let normalizer = normalizer.clone();
            let tx = tx.clone();
            let counts = counts.clone();
            tokio::spawn(async move {
                loop {
                    let Some(record) = ({ rx.lock().await.recv().await }) else {
                        return;
                    };
                    if let Some(entry) = normalizer.http(record) {
                        counter(&counts).fetch_add(1, Ordering::Relaxed);
                        if tx.send(entry).await.is_err() {
                            return;
                        }
                    }
                }
            })
        })
        .collect()
}

pub fn spawn_ssl_pool(
    workers: usize,
    rx: mpsc::Receiver<SslRecord>,
    normalizer: Arc<Normalizer>,
    tx: mpsc::Sender<SslEntry>,
    counts: Arc<ResultCounts>,
    counter: CounterFn,
) -> Vec<JoinHandle<()>> {
    let rx = shared(rx);
    (0..workers.max(1))
        .map(|_| {
            let rx = rx.clone();
            let normalizer = normalizer.clone();
            let tx = tx.clone();
            let counts = counts.clone();
            tokio::spawn(async move {
                loop {
                    let Some(record) = ({ rx.lock().await.recv().await }) else {
                        return;
                    };
                    if let Some(entry) = normalizer.ssl(record) {
                        counter(&counts).fetch_add(1, Ordering::Relaxed);
                        if tx.send(entry).await.is_err() {
                            return;
                        }
                    }
                }
            })
        })
        .collect()
}
