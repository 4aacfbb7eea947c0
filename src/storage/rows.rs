//! Row binding: maps entry types onto their tables' column lists.

use crate::normalize::entries::{ConnEntry, DnsEntry, HttpEntry, PdnsEntry, SslEntry};
use duckdb::{params, Statement};

/// A normalized entry that knows how to write itself into a prepared
/// `INSERT OR IGNORE` statement. Tmp and final tables share shapes, so the
/// target table is the writer's choice, not the row's.
pub trait TableRow: Send + Sync + Clone + 'static {
    const COLUMNS: &'static [&'static str];

    fn insert(&self, stmt: &mut Statement<'_>) -> duckdb::Result<()>;
}

/// Build the prepared-once insert statement for a table.
pub fn insert_sql<E: TableRow>(db: &str, table: &str) -> String {
    let columns = E::COLUMNS.join(", ");
    let placeholders = vec!["?"; E::COLUMNS.len()].join(", ");
    format!("INSERT OR IGNORE INTO {db}.{table} ({columns}) VALUES ({placeholders})")
}

impl TableRow for ConnEntry {
    const COLUMNS: &'static [&'static str] = &[
        "import_time",
        "import_id",
        "zeek_uid_hash",
        "hash",
        "ts",
        "src",
        "src_nuid",
        "dst",
        "dst_nuid",
        "src_port",
        "dst_port",
        "proto",
        "service",
        "duration",
        "src_local",
        "dst_local",
        "src_bytes",
        "dst_bytes",
        "src_ip_bytes",
        "dst_ip_bytes",
        "src_packets",
        "dst_packets",
        "conn_state",
        "missed_bytes",
        "icmp_type",
        "icmp_code",
        "filtered",
        "missing_host_header",
        "missing_host_useragent",
    ];

    fn insert(&self, stmt: &mut Statement<'_>) -> duckdb::Result<()> {
        stmt.execute(params![
            self.import_time.timestamp_micros(),
            self.import_id,
            self.zeek_uid_hash,
            self.hash,
            self.ts,
            self.src,
            self.src_nuid,
            self.dst,
            self.dst_nuid,
            self.src_port,
            self.dst_port,
            self.proto,
            self.service,
            self.duration,
            self.src_local,
            self.dst_local,
            self.src_bytes,
            self.dst_bytes,
            self.src_ip_bytes,
            self.dst_ip_bytes,
            self.src_packets,
            self.dst_packets,
            self.conn_state,
            self.missed_bytes,
            self.icmp_type,
            self.icmp_code,
            self.filtered,
            self.missing_host_header,
            self.missing_host_useragent,
        ])?;
        Ok(())
    }
}

impl TableRow for HttpEntry {
    const COLUMNS: &'static [&'static str] = &[
        "import_time",
        "import_id",
        "zeek_uid_hash",
        "hash",
        "ts",
        "src",
        "src_nuid",
        "dst",
        "dst_nuid",
        "src_port",
        "dst_port",
        "method",
        "host",
        "uri",
        "referrer",
        "useragent",
        "status_code",
        "proxied",
        "resp_mime_types",
        "duration",
        "src_bytes",
        "dst_bytes",
        "src_packets",
        "dst_packets",
        "conn_state",
        "multi_request",
    ];

    fn insert(&self, stmt: &mut Statement<'_>) -> duckdb::Result<()> {
        stmt.execute(params![
            self.import_time.timestamp_micros(),
            self.import_id,
            self.zeek_uid_hash,
            self.hash,
            self.ts,
            self.src,
            self.src_nuid,
            self.dst,
            self.dst_nuid,
            self.src_port,
            self.dst_port,
            self.method,
            self.host,
            self.uri,
            self.referrer,
            self.useragent,
            self.status_code,
            self.proxied.join(","),
            self.resp_mime_types.join(","),
            self.duration,
            self.src_bytes,
            self.dst_bytes,
            self.src_packets,
            self.dst_packets,
            self.conn_state,
            self.multi_request,
        ])?;
        Ok(())
    }
}

impl TableRow for SslEntry {
    const COLUMNS: &'static [&'static str] = &[
        "import_time",
        "import_id",
        "zeek_uid_hash",
        "hash",
        "ts",
        "src",
        "src_nuid",
        "dst",
        "dst_nuid",
        "src_port",
        "dst_port",
        "server_name",
        "version",
        "cipher",
        "validation_status",
        "ja3",
        "duration",
        "src_bytes",
        "dst_bytes",
        "src_packets",
        "dst_packets",
        "conn_state",
    ];

    fn insert(&self, stmt: &mut Statement<'_>) -> duckdb::Result<()> {
        stmt.execute(params![
            self.import_time.timestamp_micros(),
            self.import_id,
            self.zeek_uid_hash,
            self.hash,
            self.ts,
            self.src,
            self.src_nuid,
            self.dst,
            self.dst_nuid,
            self.src_port,
            self.dst_port,
            self.server_name,
            self.version,
            self.cipher,
            self.validation_status,
            self.ja3,
            self.duration,
            self.src_bytes,
            self.dst_bytes,
            self.src_packets,
            self.dst_packets,
            self.conn_state,
        ])?;
        Ok(())
    }
}

impl TableRow for DnsEntry {
    const COLUMNS: &'static [&'static str] = &[
        "import_time",
        "import_id",
        "zeek_uid_hash",
        "hash",
        "ts",
        "src",
        "src_nuid",
        "dst",
        "dst_nuid",
        "src_port",
        "dst_port",
        "query",
        "qtype",
        "qtype_name",
        "rcode",
        "rcode_name",
        "answers",
    ];

    fn insert(&self, stmt: &mut Statement<'_>) -> duckdb::Result<()> {
        stmt.execute(params![
            self.import_time.timestamp_micros(),
            self.import_id,
            self.zeek_uid_hash,
            self.hash,
            self.ts,
            self.src,
            self.src_nuid,
            self.dst,
            self.dst_nuid,
            self.src_port,
            self.dst_port,
            self.query,
            self.qtype,
            self.qtype_name,
            self.rcode,
            self.rcode_name,
            self.answers.join(","),
        ])?;
        Ok(())
    }
}

impl TableRow for PdnsEntry {
    const COLUMNS: &'static [&'static str] = &[
        "import_time",
        "import_id",
        "zeek_uid_hash",
        "hash",
        "ts",
        "src",
        "src_nuid",
        "dst",
        "dst_nuid",
        "query",
        "resolved_ip",
    ];

    fn insert(&self, stmt: &mut Statement<'_>) -> duckdb::Result<()> {
        stmt.execute(params![
            self.import_time.timestamp_micros(),
            self.import_id,
            self.zeek_uid_hash,
            self.hash,
            self.ts,
            self.src,
            self.src_nuid,
            self.dst,
            self.dst_nuid,
            self.query,
            self.resolved_ip,
        ])?;
        Ok(())
    }
}
