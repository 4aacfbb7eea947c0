use super::store::ColumnStore;
use super::{StorageError, WildcardPattern};
use crate::walker::LogFile;
use duckdb::params;
use tracing::info;

/// Process-wide import bookkeeping, backed by the `metadatabase` schema.
/// All metadatabase writes go through this type.
#[derive(Clone)]
pub struct Catalog {
    store: ColumnStore,
}

#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub name: String,
    pub rolling: bool,
    pub min_ts: Option<i64>,
    pub max_ts: Option<i64>,
}

impl Catalog {
    pub fn new(store: ColumnStore) -> Self {
        Self { store }
    }

    /// Register a database and its rolling flag. Idempotent.
    pub async fn register_database(
        &self,
        db: &str,
        rolling: bool,
        created_at_micros: i64,
    ) -> Result<(), StorageError> {
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO metadatabase.databases (db, rolling, created_at)
                     VALUES (?, ?, ?)",
                    params![db, rolling, created_at_micros],
                )?;
                Ok(())
            })
            .await
    }

    /// Rolling flag for a registered database, `None` if unknown.
    pub async fn database_rolling(&self, db: &str) -> Result<Option<bool>, StorageError> {
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT rolling FROM metadatabase.databases WHERE db = ?")?;
                let mut rows = stmt.query(params![db])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Has this exact file already been imported into this database?
    pub async fn already_imported(&self, file_hash: &str, db: &str) -> Result<bool, StorageError> {
        let file_hash = file_hash.to_string();
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT 1 FROM metadatabase.files WHERE db = ? AND hash = ?")?;
                let mut rows = stmt.query(params![db, file_hash])?;
                Ok(rows.next()?.is_some())
            })
            .await
    }

    /// Batch form of [`already_imported`]: keep only files the catalog has
    /// not seen for this database.
    pub async fn filter_new_files(
        &self,
        db: &str,
        files: Vec<LogFile>,
    ) -> Result<Vec<LogFile>, StorageError> {
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT 1 FROM metadatabase.files WHERE db = ? AND hash = ?")?;
                let mut fresh = Vec::with_capacity(files.len());
                for file in files {
                    let mut rows = stmt.query(params![db, file.hash])?;
                    if rows.next()?.is_none() {
                        fresh.push(file);
                    } else {
                        info!(path = %file.path.display(), "skipping previously imported file");
                    }
                }
                Ok(fresh)
            })
            .await
    }

    pub async fn record_import_start(
        &self,
        import_id: &str,
        db: &str,
        rolling: bool,
        rebuild: bool,
        started_at_micros: i64,
        file_count: u64,
    ) -> Result<(), StorageError> {
        let import_id = import_id.to_string();
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO metadatabase.imports
                     (import_id, db, rolling, rebuild, started_at, file_count)
                     VALUES (?, ?, ?, ?, ?, ?)",
                    params![import_id, db, rolling, rebuild, started_at_micros, file_count],
                )?;
                Ok(())
            })
            .await
    }

    /// Record one file acceptance. Idempotent on `(db, hash)`.
    pub async fn record_file_accepted(
        &self,
        file_hash: &str,
        import_id: &str,
        db: &str,
        path: &str,
    ) -> Result<(), StorageError> {
        let file_hash = file_hash.to_string();
        let import_id = import_id.to_string();
        let db = db.to_string();
        let path = path.to_string();
        self.store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO metadatabase.files (db, hash, import_id, path)
                     VALUES (?, ?, ?, ?)",
                    params![db, file_hash, import_id, path],
                )?;
                Ok(())
            })
            .await
    }

    /// The last mutation of an import: stamp it finished with the observed
    /// timestamp range.
    pub async fn record_import_finished(
        &self,
        import_id: &str,
        db: &str,
        finished_at_micros: i64,
        min_ts: Option<i64>,
        max_ts: Option<i64>,
    ) -> Result<(), StorageError> {
        let import_id = import_id.to_string();
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE metadatabase.imports
                     SET finished_at = ?, min_ts = ?, max_ts = ?
                     WHERE import_id = ? AND db = ?",
                    params![finished_at_micros, min_ts, max_ts, import_id, db],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, StorageError> {
        self.store
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT d.db, d.rolling, min(i.min_ts), max(i.max_ts)
                     FROM metadatabase.databases d
                     LEFT JOIN metadatabase.imports i ON d.db = i.db
                     GROUP BY d.db, d.rolling
                     ORDER BY d.db",
                )?;
                let mapped = stmt.query_map([], |row| {
                    Ok(DatabaseInfo {
                        name: row.get(0)?,
                        rolling: row.get(1)?,
                        min_ts: row.get(2)?,
                        max_ts: row.get(3)?,
                    })
                })?;
                let mut out = Vec::new();
                for info in mapped {
                    out.push(info?);
                }
                Ok(out)
            })
            .await
    }

    /// Drop one database: its schema, then its catalog records.
    pub async fn drop_database(&self, db: &str) -> Result<(), StorageError> {
        self.store.drop_database(db).await?;
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                conn.execute("DELETE FROM metadatabase.files WHERE db = ?", params![db])?;
                conn.execute("DELETE FROM metadatabase.imports WHERE db = ?", params![db])?;
                conn.execute("DELETE FROM metadatabase.databases WHERE db = ?", params![db])?;
                Ok(())
            })
            .await
    }

    /// Drop every database whose name matches the trimmed wildcard
    /// pattern. Returns how many were dropped.
    pub async fn drop_matching(&self, pattern: &WildcardPattern) -> Result<usize, StorageError> {
        let matching: Vec<String> = self
            .list_databases()
            .await?
            .into_iter()
            .map(|info| info.name)
            .filter(|name| pattern.matches(name))
            .collect();
        for name in &matching {
            info!(db = %name, "dropping database");
            self.drop_database(name).await?;
        }
        Ok(matching.len())
    }

    /// Count of accepted files recorded for a database.
    pub async fn file_count(&self, db: &str) -> Result<u64, StorageError> {
        let db = db.to_string();
        self.store
            .with_conn(move |conn| {
                let count: u64 = conn.query_row(
                    "SELECT count(*) FROM metadatabase.files WHERE db = ?",
                    params![db],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::hashing::string_hash;
    use crate::walker::LogKind;
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use std::time::SystemTime;

    async fn catalog() -> Catalog {
        let store = ColumnStore::in_memory().unwrap();
        store.init().await.unwrap();
        Catalog::new(store)
    }

    fn log_file(path: &str) -> LogFile {
        LogFile {
            path: PathBuf::from(path),
            mtime: SystemTime::UNIX_EPOCH,
            kind: LogKind::Conn,
            day: NaiveDate::from_ymd_opt(2024, 4, 29).unwrap(),
            hour: 0,
            hash: string_hash(path),
        }
    }

    #[tokio::test]
    async fn test_file_acceptance_is_idempotent() {
        let catalog = catalog().await;
        let file = log_file("/logs/conn.log");

        assert!(!catalog.already_imported(&file.hash, "sensor_one").await.unwrap());

        catalog
            .record_file_accepted(&file.hash, "import_a", "sensor_one", "/logs/conn.log")
            .await
            .unwrap();
        catalog
            .record_file_accepted(&file.hash, "import_b", "sensor_one", "/logs/conn.log")
            .await
            .unwrap();

        assert!(catalog.already_imported(&file.hash, "sensor_one").await.unwrap());
        assert_eq!(catalog.file_count("sensor_one").await.unwrap(), 1);

        // The same file in a different database is a different record
        assert!(!catalog.already_imported(&file.hash, "sensor_two").await.unwrap());
    }

    #[tokio::test]
    async fn test_filter_new_files() {
        let catalog = catalog().await;
        let a = log_file("/logs/conn.log");
        let b = log_file("/logs/dns.log");

        catalog
            .record_file_accepted(&a.hash, "import_a", "sensor_one", "/logs/conn.log")
            .await
            .unwrap();

        let fresh = catalog
            .filter_new_files("sensor_one", vec![a.clone(), b.clone()])
            .await
            .unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].path, b.path);
    }

    #[tokio::test]
    async fn test_import_lifecycle_and_listing() {
        let catalog = catalog().await;
        catalog
            .register_database("sensor_one", true, 1_000)
            .await
            .unwrap();
        catalog
            .record_import_start("import_a", "sensor_one", true, false, 1_000, 3)
            .await
            .unwrap();
        catalog
            .record_import_finished("import_a", "sensor_one", 2_000, Some(100), Some(200))
            .await
            .unwrap();

        let dbs = catalog.list_databases().await.unwrap();
        assert_eq!(dbs.len(), 1);
        assert_eq!(dbs[0].name, "sensor_one");
        assert!(dbs[0].rolling);
        assert_eq!(dbs[0].min_ts, Some(100));
        assert_eq!(dbs[0].max_ts, Some(200));

        assert_eq!(catalog.database_rolling("sensor_one").await.unwrap(), Some(true));
        assert_eq!(catalog.database_rolling("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drop_matching() {
        let store = ColumnStore::in_memory().unwrap();
        store.init().await.unwrap();
        let catalog = Catalog::new(store.clone());

        for name in ["bingo_prod", "bingo_dev", "other_db"] {
            store.create_database(name).await.unwrap();
            catalog.register_database(name, false, 0).await.unwrap();
        }

        let pattern = crate::storage::trim_wildcards("bingo*").unwrap();
        let dropped = catalog.drop_matching(&pattern).await.unwrap();
        assert_eq!(dropped, 2);

        let remaining = catalog.list_databases().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "other_db");
    }
}
