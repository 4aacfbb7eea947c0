use super::digest::{
    spawn_conn_pool, spawn_digesters, spawn_dns_pool, spawn_http_pool, spawn_ssl_pool,
    FileAccepted, RecordSenders, ERROR_CHANNEL_CAPACITY, META_CHANNEL_CAPACITY,
    PATHS_QUEUE_CAPACITY, RECORD_CHANNEL_CAPACITY,
};
use super::season::{season, SeasonParams, SeasonStats};
use super::{CountsSnapshot, FileFailure, ImportError, ResultCounts};
use crate::config::Config;
use crate::filter::FilterPolicy;
use crate::normalize::entries::{ConnEntry, DnsEntry, HttpEntry, PdnsEntry, SslEntry};
use crate::normalize::{hashing, Normalizer};
use crate::storage::{flush_limiter, Catalog, ColumnStore, StorageError, TableWriter};
use crate::walker::{discover, LogFile, WalkError};
use chrono::{NaiveDate, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Drives hour chunks end to end: channels, worker pools, catalog
/// bookkeeping, seasoning, and the tmp-table lifecycle.
pub struct Importer {
    store: ColumnStore,
    catalog: Catalog,
    config: Config,
    policy: FilterPolicy,
}

/// What one successfully ingested hour chunk produced.
#[derive(Debug)]
pub struct ChunkOutcome {
    pub import_id: String,
    pub counts: CountsSnapshot,
    pub season: SeasonStats,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug)]
pub enum ChunkResult {
    Imported(ChunkOutcome),
    /// The catalog had already seen every file in the chunk.
    AlreadyImported,
}

#[derive(Debug)]
pub struct ChunkReport {
    pub day: NaiveDate,
    pub hour: u8,
    pub result: ChunkResult,
}

/// Outcome of a whole `import` invocation.
#[derive(Debug)]
pub struct ImportSummary {
    pub chunks: Vec<ChunkReport>,
    pub walk_errors: Vec<WalkError>,
}

impl Importer {
    pub fn new(store: ColumnStore, catalog: Catalog, config: Config) -> Self {
        let policy = FilterPolicy::new(&config.filtering);
        Self {
            store,
            catalog,
            config,
            policy,
        }
    }

    /// Validate the target database against the rolling/rebuild flags and
    /// make sure its schema exists.
    pub async fn prepare_database(
        &self,
        db: &str,
        rolling: bool,
        rebuild: bool,
    ) -> Result<(), ImportError> {
        crate::storage::validate_database_name(db)?;

        match self.catalog.database_rolling(db).await? {
            Some(_) if rebuild => {
                info!(db, "rebuilding: dropping existing database");
                self.catalog.drop_database(db).await?;
            }
            Some(true) if rolling => {
                // Appending another chunk to a rolling database
            }
            Some(_) => return Err(ImportError::DatabaseExists(db.to_string())),
            None => {}
        }

        self.store.create_database(db).await?;
        self.catalog
            .register_database(db, rolling, Utc::now().timestamp_micros())
            .await?;
        Ok(())
    }

    /// Walk a directory, plan day/hour buckets, and ingest each populated
    /// hour as its own chunk, days ascending.
    pub async fn ingest_directory(
        &self,
        db: &str,
        root: &Path,
        rolling: bool,
        rebuild: bool,
        cancel: &CancellationToken,
    ) -> Result<ImportSummary, ImportError> {
        let today = Utc::now().date_naive();
        let discovery = discover(root, rolling, self.config.import.retention_days, today)?;

        self.prepare_database(db, rolling, rebuild).await?;

        let mut chunks = Vec::new();
        for day in &discovery.plan.days {
            for (hour, bucket) in day.hours.iter().enumerate() {
                if bucket.is_empty() {
                    continue;
                }
                if cancel.is_cancelled() {
                    return Err(ImportError::Cancelled);
                }
                let files = bucket.files_in_feed_order();
                info!(db, day = %day.day, hour, files = files.len(), "ingesting hour chunk");

                let result = match self.ingest_hour(db, files, rolling, rebuild, cancel).await {
                    Ok(outcome) => {
                        info!(
                            db,
                            import_id = %outcome.import_id,
                            records = outcome.counts.total(),
                            "hour chunk imported"
                        );
                        ChunkResult::Imported(outcome)
                    }
                    Err(ImportError::AllFilesPreviouslyImported) => {
                        info!(db, day = %day.day, hour, "hour chunk already imported");
                        ChunkResult::AlreadyImported
                    }
                    Err(e) => return Err(e),
                };
                chunks.push(ChunkReport {
                    day: day.day,
                    hour: hour as u8,
                    result,
                });
            }
        }

        Ok(ImportSummary {
            chunks,
            walk_errors: discovery.errors,
        })
    }

    /// Ingest one hour chunk end to end. The chunk is the caller's unit of
    /// retry; partial writes are safe to replay thanks to the catalog and
    /// the store's dedup keys.
    pub async fn ingest_hour(
        &self,
        db: &str,
        files: Vec<LogFile>,
        rolling: bool,
        rebuild: bool,
        cancel: &CancellationToken,
    ) -> Result<ChunkOutcome, ImportError> {
        let started_at = Utc::now();
        let import_id = hashing::import_id(started_at.timestamp_micros());

        self.store.truncate_tmp_tables(db).await?;

        let files = self.catalog.filter_new_files(db, files).await?;
        if files.is_empty() {
            return Err(ImportError::AllFilesPreviouslyImported);
        }

        self.catalog
            .record_import_start(
                &import_id,
                db,
                rolling,
                rebuild,
                started_at.timestamp_micros(),
                files.len() as u64,
            )
            .await?;

        let workers = self.config.import.worker_count();
        let batch_size = self.config.import.batch_size;
        let limiter = flush_limiter(self.config.import.writer_rate_limit);
        let counts = Arc::new(ResultCounts::default());
        let normalizer = Arc::new(Normalizer::new(
            self.policy.clone(),
            self.config.sensor_uuid(),
            started_at,
            import_id.clone(),
        ));

        // Tmp-table writers; DNS and passive-DNS skip the tmp stage
        let conn_writer: TableWriter<ConnEntry> = TableWriter::spawn(
            self.store.clone(), db, "conn_tmp", workers, batch_size, limiter.clone());
        let open_conn_writer: TableWriter<ConnEntry> = TableWriter::spawn(
            self.store.clone(), db, "open_conn_tmp", workers, batch_size, limiter.clone());
        let http_writer: TableWriter<HttpEntry> = TableWriter::spawn(
            self.store.clone(), db, "http_tmp", workers, batch_size, limiter.clone());
        let open_http_writer: TableWriter<HttpEntry> = TableWriter::spawn(
            self.store.clone(), db, "open_http_tmp", workers, batch_size, limiter.clone());
        let ssl_writer: TableWriter<SslEntry> = TableWriter::spawn(
            self.store.clone(), db, "ssl_tmp", workers, batch_size, limiter.clone());
        let open_ssl_writer: TableWriter<SslEntry> = TableWriter::spawn(
            self.store.clone(), db, "open_ssl_tmp", workers, batch_size, limiter.clone());
        let dns_writer: TableWriter<DnsEntry> = TableWriter::spawn(
            self.store.clone(), db, "dns", workers, batch_size, limiter.clone());
        let pdns_writer: TableWriter<PdnsEntry> = TableWriter::spawn(
            self.store.clone(), db, "pdns", workers, batch_size, limiter.clone());

        // Typed record channels between digesters and normalizer pools
        let (conn_tx, conn_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (open_conn_tx, open_conn_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (dns_tx, dns_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (http_tx, http_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (open_http_tx, open_http_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (ssl_tx, ssl_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
        let (open_ssl_tx, open_ssl_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);

        let mut normalizer_handles = Vec::new();
        normalizer_handles.extend(spawn_conn_pool(
            workers, conn_rx, normalizer.clone(), conn_writer.sender(),
            counts.clone(), |c| &c.conn));
        normalizer_handles.extend(spawn_conn_pool(
            workers, open_conn_rx, normalizer.clone(), open_conn_writer.sender(),
            counts.clone(), |c| &c.open_conn));
        normalizer_handles.extend(spawn_dns_pool(
            workers, dns_rx, normalizer.clone(), dns_writer.sender(),
            pdns_writer.sender(), counts.clone()));
        normalizer_handles.extend(spawn_http_pool(
            workers, http_rx, normalizer.clone(), http_writer.sender(),
            counts.clone(), |c| &c.http));
        normalizer_handles.extend(spawn_http_pool(
            workers, open_http_rx, normalizer.clone(), open_http_writer.sender(),
            counts.clone(), |c| &c.open_http));
        normalizer_handles.extend(spawn_ssl_pool(
            workers, ssl_rx, normalizer.clone(), ssl_writer.sender(),
            counts.clone(), |c| &c.ssl));
        normalizer_handles.extend(spawn_ssl_pool(
            workers, open_ssl_rx, normalizer.clone(), open_ssl_writer.sender(),
            counts.clone(), |c| &c.open_ssl));

        let senders = RecordSenders {
            conn: conn_tx,
            open_conn: open_conn_tx,
            dns: dns_tx,
            http: http_tx,
            open_http: open_http_tx,
            ssl: ssl_tx,
            open_ssl: open_ssl_tx,
        };

        let (paths_tx, paths_rx) = mpsc::channel(PATHS_QUEUE_CAPACITY);
        let (meta_tx, mut meta_rx) = mpsc::channel::<FileAccepted>(META_CHANNEL_CAPACITY);
        let (failure_tx, mut failure_rx) =
            mpsc::channel::<FileFailure>(ERROR_CHANNEL_CAPACITY);

        let digester_handles = spawn_digesters(
            workers,
            paths_rx,
            senders,
            meta_tx,
            failure_tx,
            cancel.clone(),
        );

        // A single consumer serializes catalog writes
        let meta_catalog = self.catalog.clone();
        let meta_db = db.to_string();
        let meta_import_id = import_id.clone();
        let meta_consumer = tokio::spawn(async move {
            while let Some(accepted) = meta_rx.recv().await {
                meta_catalog
                    .record_file_accepted(
                        &accepted.hash,
                        &meta_import_id,
                        &meta_db,
                        &accepted.path,
                    )
                    .await?;
            }
            Ok::<(), StorageError>(())
        });
        let failure_collector = tokio::spawn(async move {
            let mut failures = Vec::new();
            while let Some(failure) = failure_rx.recv().await {
                failures.push(failure);
            }
            failures
        });

        for file in files {
            if paths_tx.send(file).await.is_err() {
                break;
            }
        }
        drop(paths_tx);

        for result in futures::future::join_all(digester_handles).await {
            result?;
        }
        // Digesters done: their channel clones are gone, pools drain out
        for result in futures::future::join_all(normalizer_handles).await {
            result?;
        }
        meta_consumer.await??;
        let failures = failure_collector.await?;

        conn_writer.finish().await?;
        open_conn_writer.finish().await?;
        http_writer.finish().await?;
        open_http_writer.finish().await?;
        ssl_writer.finish().await?;
        open_ssl_writer.finish().await?;
        dns_writer.finish().await?;
        pdns_writer.finish().await?;

        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        let season_params = SeasonParams {
            db: db.to_string(),
            http_requests_per_uid: self.config.import.http_requests_per_uid,
            workers,
            batch_size,
            limiter,
        };
        let season_stats = season(&self.store, &season_params, cancel).await?;

        let range = self.store.import_time_range(db, &import_id).await?;
        self.catalog
            .record_import_finished(
                &import_id,
                db,
                Utc::now().timestamp_micros(),
                range.map(|r| r.0),
                range.map(|r| r.1),
            )
            .await?;

        Ok(ChunkOutcome {
            import_id,
            counts: counts.snapshot(),
            season: season_stats,
            failures,
        })
    }
}
