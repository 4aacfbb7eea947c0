use super::rows::{insert_sql, TableRow};
use super::schema::{create_table_sql, DATA_TABLES, METADATABASE_SQL, TMP_TABLES};
use super::{validate_database_name, StorageError};
use crate::normalize::entries::{HttpEntry, SslEntry};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Handle on the DuckDB column store. Cheap to clone; all access is
/// serialized behind one connection and runs on the blocking pool.
#[derive(Clone)]
pub struct ColumnStore {
    conn: Arc<Mutex<Connection>>,
}

/// One HTTP row joined to its parent conn row, plus the conn-side fields
/// missing-host synthesis needs and the per-UID recency rank.
#[derive(Debug, Clone)]
pub struct JoinedHttpRow {
    pub entry: HttpEntry,
    pub proto: String,
    pub src_local: bool,
    pub dst_local: bool,
    pub rank: u32,
}

impl ColumnStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await?
    }

    /// Create the metadatabase schema. Idempotent; runs at startup.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            for sql in METADATABASE_SQL {
                conn.execute(sql, [])?;
            }
            Ok(())
        })
        .await
    }

    /// Create a database schema with its tmp and final tables.
    pub async fn create_database(&self, db: &str) -> Result<(), StorageError> {
        validate_database_name(db)?;
        let db = db.to_string();
        self.with_conn(move |conn| {
            conn.execute(&format!("CREATE SCHEMA IF NOT EXISTS {db}"), [])?;
            for table in DATA_TABLES {
                conn.execute(&create_table_sql(&db, table), [])?;
            }
            Ok(())
        })
        .await
    }

    /// Drop a database schema and everything in it.
    pub async fn drop_database(&self, db: &str) -> Result<(), StorageError> {
        validate_database_name(db)?;
        let db = db.to_string();
        self.with_conn(move |conn| {
            conn.execute(&format!("DROP SCHEMA IF EXISTS {db} CASCADE"), [])?;
            Ok(())
        })
        .await
    }

    /// Truncate the staging tables ahead of (and after) an hour chunk.
    pub async fn truncate_tmp_tables(&self, db: &str) -> Result<(), StorageError> {
        validate_database_name(db)?;
        let db = db.to_string();
        self.with_conn(move |conn| {
            for table in TMP_TABLES {
                conn.execute(&format!("DELETE FROM {db}.{table}"), [])?;
            }
            Ok(())
        })
        .await
    }

    /// Flush one writer batch. The insert is `OR IGNORE`, so at-least-once
    /// delivery converges on the tables' dedup keys.
    pub async fn insert_batch<E: TableRow>(
        &self,
        db: &str,
        table: &str,
        rows: Vec<E>,
    ) -> Result<usize, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = insert_sql::<E>(db, table);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            for row in &rows {
                row.insert(&mut stmt)?;
            }
            Ok(rows.len())
        })
        .await
    }

    /// Promote unfiltered conn rows from tmp into the final table.
    pub async fn copy_unfiltered_conns(&self, db: &str, open: bool) -> Result<usize, StorageError> {
        let (tmp, target) = if open {
            ("open_conn_tmp", "open_conn")
        } else {
            ("conn_tmp", "conn")
        };
        let sql = format!(
            "INSERT OR IGNORE INTO {db}.{target} SELECT * FROM {db}.{tmp} WHERE NOT filtered"
        );
        self.with_conn(move |conn| Ok(conn.execute(&sql, [])?)).await
    }

    /// Inner-join tmp HTTP rows to their parent tmp conn rows, ranked most
    /// recent first within each UID and capped per UID. Conn-side fields
    /// ride along for missing-host synthesis.
    pub async fn joined_http_rows(
        &self,
        db: &str,
        open: bool,
        per_uid_cap: u32,
    ) -> Result<Vec<JoinedHttpRow>, StorageError> {
        let (http_tmp, conn_tmp) = if open {
            ("open_http_tmp", "open_conn_tmp")
        } else {
            ("http_tmp", "conn_tmp")
        };
        let sql = format!(
            "SELECT h.import_time, h.import_id, h.zeek_uid_hash, h.hash, h.ts, \
                    h.src, h.src_nuid, h.dst, h.dst_nuid, h.src_port, h.dst_port, \
                    h.method, h.host, h.uri, h.referrer, h.useragent, h.status_code, \
                    h.proxied, h.resp_mime_types, \
                    c.duration, c.src_bytes, c.dst_bytes, c.src_packets, c.dst_packets, c.conn_state, \
                    c.proto, c.src_local, c.dst_local, \
                    ROW_NUMBER() OVER (PARTITION BY h.zeek_uid_hash ORDER BY h.ts DESC, h.uri) AS request_rank \
             FROM {db}.{http_tmp} h \
             JOIN {db}.{conn_tmp} c USING (zeek_uid_hash) \
             QUALIFY request_rank <= ? \
             ORDER BY h.zeek_uid_hash, request_rank"
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(params![per_uid_cap], |row| {
                let entry = HttpEntry {
                    import_time: micros_to_datetime(row.get(0)?),
                    import_id: row.get(1)?,
                    zeek_uid_hash: row.get(2)?,
                    hash: row.get(3)?,
                    ts: row.get(4)?,
                    src: row.get(5)?,
                    src_nuid: row.get(6)?,
                    dst: row.get(7)?,
                    dst_nuid: row.get(8)?,
                    src_port: row.get(9)?,
                    dst_port: row.get(10)?,
                    method: row.get(11)?,
                    host: row.get(12)?,
                    uri: row.get(13)?,
                    referrer: row.get(14)?,
                    useragent: row.get(15)?,
                    status_code: row.get(16)?,
                    proxied: split_list(&row.get::<_, String>(17)?),
                    resp_mime_types: split_list(&row.get::<_, String>(18)?),
                    duration: row.get(19)?,
                    src_bytes: row.get(20)?,
                    dst_bytes: row.get(21)?,
                    src_packets: row.get(22)?,
                    dst_packets: row.get(23)?,
                    conn_state: row.get(24)?,
                    multi_request: false,
                };
                Ok(JoinedHttpRow {
                    entry,
                    proto: row.get(25)?,
                    src_local: row.get(26)?,
                    dst_local: row.get(27)?,
                    rank: row.get(28)?,
                })
            })?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            Ok(rows)
        })
        .await
    }

    /// Inner-join tmp SSL rows to their parent tmp conn rows. Row hashes
    /// are recomputed by the caller.
    pub async fn joined_ssl_rows(
        &self,
        db: &str,
        open: bool,
    ) -> Result<Vec<SslEntry>, StorageError> {
        let (ssl_tmp, conn_tmp) = if open {
            ("open_ssl_tmp", "open_conn_tmp")
        } else {
            ("ssl_tmp", "conn_tmp")
        };
        let sql = format!(
            "SELECT s.import_time, s.import_id, s.zeek_uid_hash, s.ts, \
                    s.src, s.src_nuid, s.dst, s.dst_nuid, s.src_port, s.dst_port, \
                    s.server_name, s.version, s.cipher, s.validation_status, s.ja3, \
                    c.duration, c.src_bytes, c.dst_bytes, c.src_packets, c.dst_packets, c.conn_state \
             FROM {db}.{ssl_tmp} s \
             JOIN {db}.{conn_tmp} c USING (zeek_uid_hash) \
             ORDER BY s.zeek_uid_hash, s.ts"
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map([], |row| {
                Ok(SslEntry {
                    import_time: micros_to_datetime(row.get(0)?),
                    import_id: row.get(1)?,
                    zeek_uid_hash: row.get(2)?,
                    hash: String::new(),
                    ts: row.get(3)?,
                    src: row.get(4)?,
                    src_nuid: row.get(5)?,
                    dst: row.get(6)?,
                    dst_nuid: row.get(7)?,
                    src_port: row.get(8)?,
                    dst_port: row.get(9)?,
                    server_name: row.get(10)?,
                    version: row.get(11)?,
                    cipher: row.get(12)?,
                    validation_status: row.get(13)?,
                    ja3: row.get(14)?,
                    duration: row.get(15)?,
                    src_bytes: row.get(16)?,
                    dst_bytes: row.get(17)?,
                    src_packets: row.get(18)?,
                    dst_packets: row.get(19)?,
                    conn_state: row.get(20)?,
                })
            })?;
            let mut rows = Vec::new();
            for row in mapped {
                rows.push(row?);
            }
            Ok(rows)
        })
        .await
    }

    /// Observed timestamp range of one import across the final tables.
    pub async fn import_time_range(
        &self,
        db: &str,
        import_id: &str,
    ) -> Result<Option<(i64, i64)>, StorageError> {
        let selects: Vec<String> = ["conn", "open_conn", "http", "open_http", "ssl", "open_ssl", "dns"]
            .iter()
            .map(|table| format!("SELECT ts FROM {db}.{table} WHERE import_id = ?"))
            .collect();
        let sql = format!("SELECT min(ts), max(ts) FROM ({})", selects.join(" UNION ALL "));
        let import_id = import_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let ids: Vec<&dyn duckdb::ToSql> = std::iter::repeat(&import_id as &dyn duckdb::ToSql)
                .take(7)
                .collect();
            let mut rows = stmt.query(&ids[..])?;
            if let Some(row) = rows.next()? {
                let min: Option<i64> = row.get(0)?;
                let max: Option<i64> = row.get(1)?;
                return Ok(min.zip(max));
            }
            Ok(None)
        })
        .await
    }

    /// Row count matching a predicate. Diagnostics and test helper; the
    /// predicate is trusted SQL.
    pub async fn count_where(
        &self,
        db: &str,
        table: &str,
        predicate: &str,
    ) -> Result<u64, StorageError> {
        let sql = format!("SELECT count(*) FROM {db}.{table} WHERE {predicate}");
        self.with_conn(move |conn| {
            let count: u64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count)
        })
        .await
    }

    /// Row count of one table; counts the whole table unless an import id
    /// narrows it.
    pub async fn table_count(
        &self,
        db: &str,
        table: &str,
        import_id: Option<&str>,
    ) -> Result<u64, StorageError> {
        let sql = match import_id {
            Some(_) => format!("SELECT count(*) FROM {db}.{table} WHERE import_id = ?"),
            None => format!("SELECT count(*) FROM {db}.{table}"),
        };
        let import_id = import_id.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let count: u64 = match import_id {
                Some(id) => stmt.query_row(params![id], |row| row.get(0))?,
                None => stmt.query_row([], |row| row.get(0))?,
            };
            Ok(count)
        })
        .await
    }
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or_default()
}

fn split_list(joined: &str) -> Vec<String> {
    joined
        .split_terminator(',')
        .map(str::to_string)
        .collect()
}
