//! Shared fixture helpers: write small Zeek TSV logs into a temp tree and
//! stand up an importer over an in-memory store.

use stakeout::config::types::Config;
use stakeout::importer::Importer;
use stakeout::storage::{Catalog, ColumnStore};
use std::fmt::Write as _;
use std::path::Path;

pub const HOUR_TS: i64 = 1721649600; // 2024-07-22 12:00:00 UTC

fn tsv_header(path: &str, fields: &str, types: &str) -> String {
    format!(
        "#separator \\x09\n\
         #set_separator\t,\n\
         #empty_field\t(empty)\n\
         #unset_field\t-\n\
         #path\t{path}\n\
         #fields\t{fields}\n\
         #types\t{types}\n"
    )
}

/// conn/open_conn log with one row per `(uid, src, dst)` triple.
pub fn conn_log(path_directive: &str, rows: &[(&str, &str, &str)]) -> String {
    let mut out = tsv_header(
        path_directive,
        "ts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tproto\tservice\tduration\torig_bytes\tresp_bytes\tconn_state\torig_pkts\tresp_pkts",
        "time\tstring\taddr\tport\taddr\tport\tenum\tstring\tinterval\tcount\tcount\tstring\tcount\tcount",
    );
    for (i, (uid, src, dst)) in rows.iter().enumerate() {
        writeln!(
            out,
            "{}.0\t{uid}\t{src}\t{}\t{dst}\t443\ttcp\tssl\t1.5\t{}\t{}\tSF\t10\t12",
            HOUR_TS + i as i64,
            50000 + i,
            1024 + i,
            4096 + i,
        )
        .unwrap();
    }
    out
}

/// http/open_http log with one row per `(uid, src, dst, host, useragent)`.
pub fn http_log(path_directive: &str, rows: &[(&str, &str, &str, &str, &str)]) -> String {
    let mut out = tsv_header(
        path_directive,
        "ts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tmethod\thost\turi\tuser_agent\tstatus_code",
        "time\tstring\taddr\tport\taddr\tport\tstring\tstring\tstring\tstring\tcount",
    );
    for (i, (uid, src, dst, host, useragent)) in rows.iter().enumerate() {
        let host = if host.is_empty() { "-" } else { *host };
        writeln!(
            out,
            "{}.0\t{uid}\t{src}\t{}\t{dst}\t80\tGET\t{host}\t/page/{i}\t{useragent}\t200",
            HOUR_TS + i as i64,
            50000 + i,
        )
        .unwrap();
    }
    out
}

/// ssl/open_ssl log with one row per `(uid, src, dst, server_name)`.
pub fn ssl_log(path_directive: &str, rows: &[(&str, &str, &str, &str)]) -> String {
    let mut out = tsv_header(
        path_directive,
        "ts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tversion\tcipher\tserver_name\tja3",
        "time\tstring\taddr\tport\taddr\tport\tstring\tstring\tstring\tstring",
    );
    for (i, (uid, src, dst, server_name)) in rows.iter().enumerate() {
        writeln!(
            out,
            "{}.0\t{uid}\t{src}\t{}\t{dst}\t443\tTLSv12\tTLS_AES_128_GCM_SHA256\t{server_name}\tabc123",
            HOUR_TS + i as i64,
            50000 + i,
        )
        .unwrap();
    }
    out
}

/// dns log with one row per `(uid, query, qtype_name, answers)`.
pub fn dns_log(rows: &[(&str, &str, &str, &str)]) -> String {
    let mut out = tsv_header(
        "dns",
        "ts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tproto\tquery\tqtype_name\trcode_name\tanswers\tTTLs",
        "time\tstring\taddr\tport\taddr\tport\tenum\tstring\tstring\tstring\tvector[string]\tvector[interval]",
    );
    for (i, (uid, query, qtype_name, answers)) in rows.iter().enumerate() {
        let answers = if answers.is_empty() { "-" } else { *answers };
        writeln!(
            out,
            "{}.0\t{uid}\t10.0.0.5\t5353\t8.8.8.8\t53\tudp\t{query}\t{qtype_name}\tNOERROR\t{answers}\t300.0",
            HOUR_TS + i as i64,
        )
        .unwrap();
    }
    out
}

pub fn write_log(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// Importer over a fresh in-memory store, two workers per pool.
pub async fn test_importer() -> (ColumnStore, Catalog, Importer) {
    let store = ColumnStore::in_memory().unwrap();
    store.init().await.unwrap();
    let catalog = Catalog::new(store.clone());

    let mut config = Config::default();
    config.import.workers = 2;

    let importer = Importer::new(store.clone(), catalog.clone(), config);
    (store, catalog, importer)
}
