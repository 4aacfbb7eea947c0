//! End-to-end hour-chunk ingestion against an in-memory column store.

mod fixtures;

use fixtures::*;
use stakeout::importer::{ChunkResult, ImportError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const INTERNAL: [&str; 5] = ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"];
const EXTERNAL: [&str; 5] = [
    "93.184.216.34",
    "93.184.216.35",
    "198.51.100.7",
    "198.51.100.8",
    "203.0.113.9",
];

/// One hour of all seven log kinds, five rows each. HTTP and SSL rows
/// share UIDs with their conn parents so the seasoning joins land.
fn write_full_hour(dir: &TempDir) {
    let conn_rows: Vec<(&str, &str, &str)> = (0..5)
        .map(|i| (["C1", "C2", "C3", "C4", "C5"][i], INTERNAL[i], EXTERNAL[i]))
        .collect();
    write_log(dir.path(), "conn.log", &conn_log("conn", &conn_rows));

    let open_conn_rows: Vec<(&str, &str, &str)> = (0..5)
        .map(|i| (["O1", "O2", "O3", "O4", "O5"][i], INTERNAL[i], EXTERNAL[i]))
        .collect();
    write_log(
        dir.path(),
        "open_conn.log",
        &conn_log("open_conn", &open_conn_rows),
    );

    let http_rows: Vec<(&str, &str, &str, &str, &str)> = (0..5)
        .map(|i| {
            (
                ["C1", "C2", "C3", "C4", "C5"][i],
                INTERNAL[i],
                EXTERNAL[i],
                "www.example.com",
                "curl/8.0",
            )
        })
        .collect();
    write_log(dir.path(), "http.log", &http_log("http", &http_rows));

    let open_http_rows: Vec<(&str, &str, &str, &str, &str)> = (0..5)
        .map(|i| {
            (
                ["O1", "O2", "O3", "O4", "O5"][i],
                INTERNAL[i],
                EXTERNAL[i],
                "www.example.com",
                "curl/8.0",
            )
        })
        .collect();
    write_log(
        dir.path(),
        "open_http.log",
        &http_log("open_http", &open_http_rows),
    );

    let ssl_rows: Vec<(&str, &str, &str, &str)> = (0..5)
        .map(|i| {
            (
                ["C1", "C2", "C3", "C4", "C5"][i],
                INTERNAL[i],
                EXTERNAL[i],
                "tls.example.com",
            )
        })
        .collect();
    write_log(dir.path(), "ssl.log", &ssl_log("ssl", &ssl_rows));

    let open_ssl_rows: Vec<(&str, &str, &str, &str)> = (0..5)
        .map(|i| {
            (
                ["O1", "O2", "O3", "O4", "O5"][i],
                INTERNAL[i],
                EXTERNAL[i],
                "tls.example.com",
            )
        })
        .collect();
    write_log(
        dir.path(),
        "open_ssl.log",
        &ssl_log("open_ssl", &open_ssl_rows),
    );

    // Three A queries with address answers, one with a CNAME answer mixed
    // in, one non-A query
    write_log(
        dir.path(),
        "dns.log",
        &dns_log(&[
            ("D1", "one.example.com", "A", "93.184.216.34"),
            ("D2", "two.example.com", "A", "93.184.216.35"),
            ("D3", "three.example.com", "A", "cdn.example.net,93.184.216.36"),
            ("D4", "four.example.com", "AAAA", "2606:2800:220:1::1"),
            ("D5", "five.example.com", "TXT", ""),
        ]),
    );
}

#[tokio::test]
async fn test_happy_path_single_hour() {
    let dir = TempDir::new().unwrap();
    write_full_hour(&dir);

    let (store, catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    let summary = importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.chunks.len(), 1);
    assert!(summary.walk_errors.is_empty());
    let ChunkResult::Imported(outcome) = &summary.chunks[0].result else {
        panic!("chunk should import");
    };

    // Result counts per kind
    assert_eq!(outcome.counts.conn, 5);
    assert_eq!(outcome.counts.open_conn, 5);
    assert_eq!(outcome.counts.http, 5);
    assert_eq!(outcome.counts.open_http, 5);
    assert_eq!(outcome.counts.ssl, 5);
    assert_eq!(outcome.counts.open_ssl, 5);
    assert_eq!(outcome.counts.dns, 5);
    assert_eq!(outcome.counts.pdns, 3);
    assert!(outcome.failures.is_empty());

    // Catalog holds one record per accepted file
    assert_eq!(catalog.file_count("sensor_one").await.unwrap(), 7);

    // Final tables are populated, tmp tables truncated
    for (table, expected) in [
        ("conn", 5),
        ("open_conn", 5),
        ("http", 5),
        ("open_http", 5),
        ("ssl", 5),
        ("open_ssl", 5),
        ("dns", 5),
        ("pdns", 3),
    ] {
        assert_eq!(
            store.table_count("sensor_one", table, None).await.unwrap(),
            expected,
            "{table}"
        );
    }
    for table in [
        "conn_tmp",
        "open_conn_tmp",
        "http_tmp",
        "open_http_tmp",
        "ssl_tmp",
        "open_ssl_tmp",
    ] {
        assert_eq!(
            store.table_count("sensor_one", table, None).await.unwrap(),
            0,
            "{table} should be truncated"
        );
    }

    // No filtered row survives into the final conn tables
    assert_eq!(
        store.count_where("sensor_one", "conn", "filtered").await.unwrap(),
        0
    );

    // Every final row carries the chunk's import id
    let id_predicate = format!("import_id = '{}'", outcome.import_id);
    assert_eq!(
        store
            .count_where("sensor_one", "http", &id_predicate)
            .await
            .unwrap(),
        5
    );

    // Passive-DNS rows share their parent DNS row's hash
    assert_eq!(
        store
            .count_where(
                "sensor_one",
                "pdns",
                "hash IN (SELECT hash FROM sensor_one.dns)"
            )
            .await
            .unwrap(),
        3
    );

    // The import is recorded with its observed time range
    let dbs = catalog.list_databases().await.unwrap();
    assert_eq!(dbs.len(), 1);
    assert!(!dbs[0].rolling);
    assert_eq!(dbs[0].min_ts, Some(HOUR_TS));
    assert!(dbs[0].max_ts.unwrap() > HOUR_TS);
}

#[tokio::test]
async fn test_reimport_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_full_hour(&dir);

    let (store, catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();

    importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();
    let files_before = catalog.file_count("sensor_one").await.unwrap();
    let conns_before = store.table_count("sensor_one", "conn", None).await.unwrap();

    // Second run over identical input: the only chunk reports as already
    // imported, nothing new lands anywhere. Re-running against an
    // existing non-rolling database requires neither rebuild nor rolling
    // because every file is skipped before any table is touched.
    let err = importer
        .ingest_hour("sensor_one", file_list(&dir), false, false, &cancel)
        .await;
    assert!(matches!(err, Err(ImportError::AllFilesPreviouslyImported)));

    assert_eq!(catalog.file_count("sensor_one").await.unwrap(), files_before);
    assert_eq!(
        store.table_count("sensor_one", "conn", None).await.unwrap(),
        conns_before
    );
}

/// Rediscover the fixture directory and flatten it to one hour's files.
fn file_list(dir: &TempDir) -> Vec<stakeout::walker::LogFile> {
    let discovery = stakeout::walker::discover(
        dir.path(),
        false,
        15,
        chrono::Utc::now().date_naive(),
    )
    .unwrap();
    discovery.plan.days[0].hours[0].files_in_feed_order()
}

#[tokio::test]
async fn test_missing_host_header_synthesis() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "conn.log",
        &conn_log("conn", &[("CM1", "10.0.0.1", "93.184.216.34")]),
    );
    write_log(
        dir.path(),
        "http.log",
        &http_log("http", &[("CM1", "10.0.0.1", "93.184.216.34", "", "AgentX")]),
    );

    let (store, _catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();

    // No HTTP final row; instead a flagged conn row carrying the useragent
    assert_eq!(store.table_count("sensor_one", "http", None).await.unwrap(), 0);
    assert_eq!(
        store
            .count_where(
                "sensor_one",
                "conn",
                "missing_host_header AND missing_host_useragent = 'AgentX'"
            )
            .await
            .unwrap(),
        1
    );
    // The real conn row for the same flow is promoted too
    assert_eq!(
        store
            .count_where("sensor_one", "conn", "NOT missing_host_header")
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_multi_request_ranking_caps_per_uid() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "conn.log",
        &conn_log("conn", &[("CR1", "10.0.0.1", "93.184.216.34")]),
    );
    // 25 requests on one connection
    let rows: Vec<(&str, &str, &str, &str, &str)> = (0..25)
        .map(|_| ("CR1", "10.0.0.1", "93.184.216.34", "www.example.com", "curl/8.0"))
        .collect();
    write_log(dir.path(), "http.log", &http_log("http", &rows));

    let (store, _catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();

    // Capped at 20 per UID, exactly one row carries the connection totals
    assert_eq!(store.table_count("sensor_one", "http", None).await.unwrap(), 20);
    assert_eq!(
        store
            .count_where("sensor_one", "http", "NOT multi_request")
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        store
            .count_where("sensor_one", "http", "multi_request AND src_bytes = 0")
            .await
            .unwrap(),
        19
    );
    // The surviving row is the most recent request
    assert_eq!(
        store
            .count_where(
                "sensor_one",
                "http",
                &format!("NOT multi_request AND ts = {}", HOUR_TS + 24)
            )
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_http_without_parent_conn_is_not_promoted() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "conn.log",
        &conn_log("conn", &[("CP1", "10.0.0.1", "93.184.216.34")]),
    );
    write_log(
        dir.path(),
        "http.log",
        &http_log(
            "http",
            &[
                ("CP1", "10.0.0.1", "93.184.216.34", "www.example.com", "curl/8.0"),
                ("ORPHAN", "10.0.0.2", "93.184.216.35", "www.example.com", "curl/8.0"),
            ],
        ),
    );

    let (store, _catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    let summary = importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();

    let ChunkResult::Imported(outcome) = &summary.chunks[0].result else {
        panic!("chunk should import");
    };
    // Both rows were normalized, but only the joined one is promoted
    assert_eq!(outcome.counts.http, 2);
    assert_eq!(store.table_count("sensor_one", "http", None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_multi_day_multi_hour_distinct_import_ids() {
    let dir = TempDir::new().unwrap();
    for day in ["2024-04-29", "2024-05-01"] {
        let day_dir = dir.path().join(day);
        std::fs::create_dir(&day_dir).unwrap();
        for hour in ["00", "23"] {
            write_log(
                &day_dir,
                &format!("conn.{hour}:00:00-{hour}:59:59.log"),
                &conn_log("conn", &[("CD1", "10.0.0.1", "93.184.216.34")]),
            );
        }
    }

    let (_store, _catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    let summary = importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.chunks.len(), 4);
    // Days ascending, hours ascending within each day
    let ordering: Vec<(String, u8)> = summary
        .chunks
        .iter()
        .map(|c| (c.day.to_string(), c.hour))
        .collect();
    assert_eq!(
        ordering,
        vec![
            ("2024-04-29".to_string(), 0),
            ("2024-04-29".to_string(), 23),
            ("2024-05-01".to_string(), 0),
            ("2024-05-01".to_string(), 23),
        ]
    );

    let mut ids: Vec<String> = summary
        .chunks
        .iter()
        .map(|c| match &c.result {
            ChunkResult::Imported(outcome) => outcome.import_id.clone(),
            ChunkResult::AlreadyImported => panic!("all chunks should import"),
        })
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4, "import ids must be distinct per chunk");
}

#[tokio::test]
async fn test_existing_database_requires_rebuild_or_rolling() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "conn.log",
        &conn_log("conn", &[("CE1", "10.0.0.1", "93.184.216.34")]),
    );

    let (_store, _catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();

    // Same non-rolling database again, no rebuild: refused up front
    let err = importer.prepare_database("sensor_one", false, false).await;
    assert!(matches!(err, Err(ImportError::DatabaseExists(_))));

    // Rebuild drops and recreates
    importer
        .prepare_database("sensor_one", false, true)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rolling_database_allows_append() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "conn.log",
        &conn_log("conn", &[("CA1", "10.0.0.1", "93.184.216.34")]),
    );

    let (store, _catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    importer
        .ingest_directory("sensor_rolling", dir.path(), true, false, &cancel)
        .await
        .unwrap();

    // A later hour arrives for the same rolling database
    let dir2 = TempDir::new().unwrap();
    let day_dir = dir2.path().join("2024-07-23");
    std::fs::create_dir(&day_dir).unwrap();
    write_log(
        &day_dir,
        "conn.01:00:00-02:00:00.log",
        &conn_log("conn", &[("CA2", "10.0.0.2", "93.184.216.35")]),
    );

    let summary = importer
        .ingest_directory("sensor_rolling", dir2.path(), true, false, &cancel)
        .await
        .unwrap();
    assert_eq!(summary.chunks.len(), 1);
    assert!(matches!(summary.chunks[0].result, ChunkResult::Imported(_)));
    assert_eq!(
        store.table_count("sensor_rolling", "conn", None).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_truncated_file_does_not_fail_chunk() {
    let dir = TempDir::new().unwrap();
    write_log(
        dir.path(),
        "conn.log",
        &conn_log("conn", &[("CT1", "10.0.0.1", "93.184.216.34")]),
    );
    // dns.log with its last line cut off mid-record
    let mut dns = dns_log(&[("DT1", "ok.example.com", "A", "93.184.216.34")]);
    dns.push_str("1721649601.0\tDT2\t10.0.0.5\t5353");
    write_log(dir.path(), "dns.log", &dns);

    let (store, catalog, importer) = test_importer().await;
    let cancel = CancellationToken::new();
    let summary = importer
        .ingest_directory("sensor_one", dir.path(), false, false, &cancel)
        .await
        .unwrap();

    let ChunkResult::Imported(outcome) = &summary.chunks[0].result else {
        panic!("chunk should import");
    };
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].path.ends_with("dns.log"));

    // The record before the truncation point still landed, and both files
    // are recorded as accepted
    assert_eq!(store.table_count("sensor_one", "dns", None).await.unwrap(), 1);
    assert_eq!(store.table_count("sensor_one", "conn", None).await.unwrap(), 1);
    assert_eq!(catalog.file_count("sensor_one").await.unwrap(), 2);
}
