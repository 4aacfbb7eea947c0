//! Seasoning: the post-parse pass that joins tmp application-layer rows
//! with their parent conn rows and promotes the results into the final
//! tables.

use super::ImportError;
use crate::normalize::entries::{ConnEntry, SslEntry};
use crate::normalize::hashing;
use crate::storage::store::JoinedHttpRow;
use crate::storage::{ColumnStore, FlushLimiter, TableWriter};
use std::net::IpAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct SeasonParams {
    pub db: String,
    pub http_requests_per_uid: u32,
    pub workers: usize,
    pub batch_size: usize,
    pub limiter: Arc<FlushLimiter>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SeasonStats {
    pub conns_promoted: usize,
    pub http_rows: u64,
    pub ssl_rows: u64,
    pub synthesized_conns: u64,
}

/// Run the full seasoning pass for one hour chunk. Honors cancellation
/// between stages; writers always drain what they have accepted. Tmp
/// tables are truncated only on full success.
pub async fn season(
    store: &ColumnStore,
    params: &SeasonParams,
    cancel: &CancellationToken,
) -> Result<SeasonStats, ImportError> {
    let db = params.db.as_str();
    let mut stats = SeasonStats::default();

    for open in [false, true] {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        stats.conns_promoted += store.copy_unfiltered_conns(db, open).await?;
    }

    for open in [false, true] {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        let (http_rows, synthesized) = season_http(store, params, open, cancel).await?;
        stats.http_rows += http_rows;
        stats.synthesized_conns += synthesized;
    }

    for open in [false, true] {
        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }
        stats.ssl_rows += season_ssl(store, params, open, cancel).await?;
    }

    store.truncate_tmp_tables(db).await?;
    info!(
        db,
        conns_promoted = stats.conns_promoted,
        http_rows = stats.http_rows,
        ssl_rows = stats.ssl_rows,
        synthesized_conns = stats.synthesized_conns,
        "seasoning complete"
    );
    Ok(stats)
}

/// Join HTTP rows to their conn rows, cap and rank them per UID, and
/// route empty-host rows into conn-row synthesis instead.
async fn season_http(
    store: &ColumnStore,
    params: &SeasonParams,
    open: bool,
    cancel: &CancellationToken,
) -> Result<(u64, u64), ImportError> {
    let db = params.db.as_str();
    let (http_table, conn_table) = if open {
        ("open_http", "open_conn")
    } else {
        ("http", "conn")
    };

    let rows = store
        .joined_http_rows(db, open, params.http_requests_per_uid)
        .await?;

    let http_writer: TableWriter<crate::normalize::entries::HttpEntry> = TableWriter::spawn(
        store.clone(),
        db,
        http_table,
        params.workers,
        params.batch_size,
        params.limiter.clone(),
    );
    let conn_writer: TableWriter<ConnEntry> = TableWriter::spawn(
        store.clone(),
        db,
        conn_table,
        params.workers,
        params.batch_size,
        params.limiter.clone(),
    );

    let http_tx = http_writer.sender();
    let conn_tx = conn_writer.sender();
    let mut emitted = 0u64;
    let mut synthesized = 0u64;
    let mut cancelled = false;

    for row in rows {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        if row.entry.host.is_empty() {
            if conn_tx.send(synthesize_missing_host_conn(&row)).await.is_err() {
                break;
            }
            synthesized += 1;
            continue;
        }

        let mut entry = row.entry;
        if row.rank > 1 {
            // Only the most recent request per UID carries the
            // connection's totals
            entry.multi_request = true;
            entry.duration = 0.0;
            entry.src_bytes = 0;
            entry.dst_bytes = 0;
            entry.src_packets = 0;
            entry.dst_packets = 0;
            entry.conn_state = String::new();
        }
        if http_tx.send(entry).await.is_err() {
            break;
        }
        emitted += 1;
    }

    drop(http_tx);
    drop(conn_tx);
    http_writer.finish().await?;
    conn_writer.finish().await?;

    if cancelled {
        return Err(ImportError::Cancelled);
    }
    Ok((emitted, synthesized))
}

/// Join SSL rows to their conn rows, recomputing each row hash from the
/// client side and the SNI.
async fn season_ssl(
    store: &ColumnStore,
    params: &SeasonParams,
    open: bool,
    cancel: &CancellationToken,
) -> Result<u64, ImportError> {
    let db = params.db.as_str();
    let table = if open { "open_ssl" } else { "ssl" };

    let rows = store.joined_ssl_rows(db, open).await?;

    let writer: TableWriter<SslEntry> = TableWriter::spawn(
        store.clone(),
        db,
        table,
        params.workers,
        params.batch_size,
        params.limiter.clone(),
    );
    let tx = writer.sender();
    let mut emitted = 0u64;
    let mut cancelled = false;

    for mut entry in rows {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        match entry.src.parse::<IpAddr>() {
            Ok(src) => {
                entry.hash = hashing::sni_row_hash(src, &entry.src_nuid, &entry.server_name);
            }
            Err(_) => {
                warn!(src = %entry.src, "skipping ssl row with unparsable source");
                continue;
            }
        }
        if tx.send(entry).await.is_err() {
            break;
        }
        emitted += 1;
    }

    drop(tx);
    writer.finish().await?;

    if cancelled {
        return Err(ImportError::Cancelled);
    }
    Ok(emitted)
}

/// An HTTP row with no host header becomes a conn row in the final table,
/// flagged and carrying the useragent so scoring can still see it.
fn synthesize_missing_host_conn(row: &JoinedHttpRow) -> ConnEntry {
    let entry = &row.entry;
    let (icmp_type, icmp_code) = if row.proto == "icmp" {
        (entry.src_port, entry.dst_port)
    } else {
        (0, 0)
    };
    let hash = match (entry.src.parse::<IpAddr>(), entry.dst.parse::<IpAddr>()) {
        (Ok(src), Ok(dst)) => {
            hashing::conn_row_hash(src, &entry.src_nuid, dst, &entry.dst_nuid)
        }
        _ => entry.hash.clone(),
    };

    ConnEntry {
        import_time: entry.import_time,
        import_id: entry.import_id.clone(),
        zeek_uid_hash: entry.zeek_uid_hash.clone(),
        hash,
        ts: entry.ts,
        src: entry.src.clone(),
        src_nuid: entry.src_nuid.clone(),
        dst: entry.dst.clone(),
        dst_nuid: entry.dst_nuid.clone(),
        src_port: entry.src_port,
        dst_port: entry.dst_port,
        proto: row.proto.clone(),
        service: "http".to_string(),
        duration: entry.duration,
        src_local: row.src_local,
        dst_local: row.dst_local,
        src_bytes: entry.src_bytes,
        dst_bytes: entry.dst_bytes,
        src_ip_bytes: 0,
        dst_ip_bytes: 0,
        src_packets: entry.src_packets,
        dst_packets: entry.dst_packets,
        conn_state: entry.conn_state.clone(),
        missed_bytes: 0,
        icmp_type,
        icmp_code,
        filtered: false,
        missing_host_header: true,
        missing_host_useragent: entry.useragent.clone(),
    }
}
