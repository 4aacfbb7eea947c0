//! Table DDL for per-database schemas and the metadatabase.
//!
//! Each logical database is one SQL schema holding tmp and final tables per
//! record kind. Tmp tables are truncated at the start of every hour chunk;
//! DNS and passive-DNS have no tmp stage. Dedup keys make the at-least-once
//! writers converge under replay.

/// Final and tmp data tables created per database, in creation order.
pub const DATA_TABLES: [&str; 14] = [
    "conn",
    "conn_tmp",
    "open_conn",
    "open_conn_tmp",
    "http",
    "http_tmp",
    "open_http",
    "open_http_tmp",
    "ssl",
    "ssl_tmp",
    "open_ssl",
    "open_ssl_tmp",
    "dns",
    "pdns",
];

/// Tmp tables truncated around every hour chunk.
pub const TMP_TABLES: [&str; 6] = [
    "conn_tmp",
    "open_conn_tmp",
    "http_tmp",
    "open_http_tmp",
    "ssl_tmp",
    "open_ssl_tmp",
];

const CONN_COLUMNS: &str = "\
    import_time BIGINT NOT NULL,
    import_id VARCHAR NOT NULL,
    zeek_uid_hash VARCHAR NOT NULL,
    hash VARCHAR NOT NULL,
    ts BIGINT NOT NULL,
    src VARCHAR NOT NULL,
    src_nuid VARCHAR NOT NULL,
    dst VARCHAR NOT NULL,
    dst_nuid VARCHAR NOT NULL,
    src_port USMALLINT NOT NULL,
    dst_port USMALLINT NOT NULL,
    proto VARCHAR NOT NULL,
    service VARCHAR NOT NULL,
    duration DOUBLE NOT NULL,
    src_local BOOLEAN NOT NULL,
    dst_local BOOLEAN NOT NULL,
    src_bytes UBIGINT NOT NULL,
    dst_bytes UBIGINT NOT NULL,
    src_ip_bytes UBIGINT NOT NULL,
    dst_ip_bytes UBIGINT NOT NULL,
    src_packets UBIGINT NOT NULL,
    dst_packets UBIGINT NOT NULL,
    conn_state VARCHAR NOT NULL,
    missed_bytes UBIGINT NOT NULL,
    icmp_type USMALLINT NOT NULL,
    icmp_code USMALLINT NOT NULL,
    filtered BOOLEAN NOT NULL,
    missing_host_header BOOLEAN NOT NULL,
    missing_host_useragent VARCHAR NOT NULL,
    PRIMARY KEY (import_id, zeek_uid_hash, hash, missing_host_header)";

const HTTP_COLUMNS: &str = "\
    import_time BIGINT NOT NULL,
    import_id VARCHAR NOT NULL,
    zeek_uid_hash VARCHAR NOT NULL,
    hash VARCHAR NOT NULL,
    ts BIGINT NOT NULL,
    src VARCHAR NOT NULL,
    src_nuid VARCHAR NOT NULL,
    dst VARCHAR NOT NULL,
    dst_nuid VARCHAR NOT NULL,
    src_port USMALLINT NOT NULL,
    dst_port USMALLINT NOT NULL,
    method VARCHAR NOT NULL,
    host VARCHAR NOT NULL,
    uri VARCHAR NOT NULL,
    referrer VARCHAR NOT NULL,
    useragent VARCHAR NOT NULL,
    status_code UBIGINT NOT NULL,
    proxied VARCHAR NOT NULL,
    resp_mime_types VARCHAR NOT NULL,
    duration DOUBLE NOT NULL,
    src_bytes UBIGINT NOT NULL,
    dst_bytes UBIGINT NOT NULL,
    src_packets UBIGINT NOT NULL,
    dst_packets UBIGINT NOT NULL,
    conn_state VARCHAR NOT NULL,
    multi_request BOOLEAN NOT NULL,
    PRIMARY KEY (import_id, zeek_uid_hash, hash, ts, uri)";

const SSL_COLUMNS: &str = "\
    import_time BIGINT NOT NULL,
    import_id VARCHAR NOT NULL,
    zeek_uid_hash VARCHAR NOT NULL,
    hash VARCHAR NOT NULL,
    ts BIGINT NOT NULL,
    src VARCHAR NOT NULL,
    src_nuid VARCHAR NOT NULL,
    dst VARCHAR NOT NULL,
    dst_nuid VARCHAR NOT NULL,
    src_port USMALLINT NOT NULL,
    dst_port USMALLINT NOT NULL,
    server_name VARCHAR NOT NULL,
    version VARCHAR NOT NULL,
    cipher VARCHAR NOT NULL,
    validation_status VARCHAR NOT NULL,
    ja3 VARCHAR NOT NULL,
    duration DOUBLE NOT NULL,
    src_bytes UBIGINT NOT NULL,
    dst_bytes UBIGINT NOT NULL,
    src_packets UBIGINT NOT NULL,
    dst_packets UBIGINT NOT NULL,
    conn_state VARCHAR NOT NULL,
    PRIMARY KEY (import_id, zeek_uid_hash, hash, ts)";

const DNS_COLUMNS: &str = "\
    import_time BIGINT NOT NULL,
    import_id VARCHAR NOT NULL,
    zeek_uid_hash VARCHAR NOT NULL,
    hash VARCHAR NOT NULL,
    ts BIGINT NOT NULL,
    src VARCHAR NOT NULL,
    src_nuid VARCHAR NOT NULL,
    dst VARCHAR NOT NULL,
    dst_nuid VARCHAR NOT NULL,
    src_port USMALLINT NOT NULL,
    dst_port USMALLINT NOT NULL,
    query VARCHAR NOT NULL,
    qtype UBIGINT NOT NULL,
    qtype_name VARCHAR NOT NULL,
    rcode UBIGINT NOT NULL,
    rcode_name VARCHAR NOT NULL,
    answers VARCHAR NOT NULL,
    PRIMARY KEY (import_id, zeek_uid_hash, hash, ts)";

const PDNS_COLUMNS: &str = "\
    import_time BIGINT NOT NULL,
    import_id VARCHAR NOT NULL,
    zeek_uid_hash VARCHAR NOT NULL,
    hash VARCHAR NOT NULL,
    ts BIGINT NOT NULL,
    src VARCHAR NOT NULL,
    src_nuid VARCHAR NOT NULL,
    dst VARCHAR NOT NULL,
    dst_nuid VARCHAR NOT NULL,
    query VARCHAR NOT NULL,
    resolved_ip VARCHAR NOT NULL,
    PRIMARY KEY (import_id, hash, resolved_ip)";

fn columns_for(table: &str) -> &'static str {
    if table.contains("conn") {
        CONN_COLUMNS
    } else if table.contains("http") {
        HTTP_COLUMNS
    } else if table.contains("ssl") {
        SSL_COLUMNS
    } else if table == "pdns" {
        PDNS_COLUMNS
    } else {
        DNS_COLUMNS
    }
}

/// DDL for one data table inside a database schema.
pub fn create_table_sql(db: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {db}.{table} (\n{}\n)",
        columns_for(table)
    )
}

/// DDL for the metadatabase, executed once at startup.
pub const METADATABASE_SQL: [&str; 4] = [
    "CREATE SCHEMA IF NOT EXISTS metadatabase",
    "CREATE TABLE IF NOT EXISTS metadatabase.databases (
        db VARCHAR PRIMARY KEY,
        rolling BOOLEAN NOT NULL,
        created_at BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS metadatabase.files (
        db VARCHAR NOT NULL,
        hash VARCHAR NOT NULL,
        import_id VARCHAR NOT NULL,
        path VARCHAR NOT NULL,
        PRIMARY KEY (db, hash)
    )",
    "CREATE TABLE IF NOT EXISTS metadatabase.imports (
        import_id VARCHAR NOT NULL,
        db VARCHAR NOT NULL,
        rolling BOOLEAN NOT NULL,
        rebuild BOOLEAN NOT NULL,
        started_at BIGINT NOT NULL,
        finished_at BIGINT,
        min_ts BIGINT,
        max_ts BIGINT,
        file_count UBIGINT NOT NULL,
        PRIMARY KEY (import_id, db)
    )",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_data_table_has_ddl() {
        for table in DATA_TABLES {
            let sql = create_table_sql("sensor_one", table);
            assert!(sql.contains(&format!("sensor_one.{table}")));
            assert!(sql.contains("import_id"));
            assert!(sql.contains("PRIMARY KEY"));
        }
    }

    #[test]
    fn test_tmp_tables_are_a_subset() {
        for table in TMP_TABLES {
            assert!(DATA_TABLES.contains(&table));
        }
    }
}
