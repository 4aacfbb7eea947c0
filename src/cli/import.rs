use crate::config::load_config;
use crate::importer::{ChunkResult, Importer};
use crate::storage::{Catalog, ColumnStore};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub async fn run(
    config_path: Option<PathBuf>,
    database: String,
    logs: PathBuf,
    rolling: bool,
    rebuild: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path.as_deref())?;

    let store = ColumnStore::open(&config.storage.path)?;
    store.init().await?;
    let catalog = Catalog::new(store.clone());
    let importer = Importer::new(store, catalog, config);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, draining and stopping");
                cancel.cancel();
            }
        }
    });

    let summary = importer
        .ingest_directory(&database, &logs, rolling, rebuild, &cancel)
        .await?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut records = 0u64;
    for chunk in &summary.chunks {
        match &chunk.result {
            ChunkResult::Imported(outcome) => {
                imported += 1;
                records += outcome.counts.total();
                println!(
                    "{} hour {:02}: {} records (conn {}, http {}, ssl {}, dns {}, pdns {}), import {}",
                    chunk.day,
                    chunk.hour,
                    outcome.counts.total(),
                    outcome.counts.conn + outcome.counts.open_conn,
                    outcome.counts.http + outcome.counts.open_http,
                    outcome.counts.ssl + outcome.counts.open_ssl,
                    outcome.counts.dns,
                    outcome.counts.pdns,
                    outcome.import_id,
                );
                for failure in &outcome.failures {
                    println!("  warning: {}: {}", failure.path.display(), failure.error);
                }
            }
            ChunkResult::AlreadyImported => {
                skipped += 1;
                println!("{} hour {:02}: already imported", chunk.day, chunk.hour);
            }
        }
    }

    if !summary.walk_errors.is_empty() {
        println!("{} file(s) skipped during discovery:", summary.walk_errors.len());
        for err in &summary.walk_errors {
            println!("  {}: {}", err.path.display(), err.kind);
        }
    }

    println!(
        "imported {imported} hour chunk(s) ({records} records) into '{database}', {skipped} already present"
    );
    Ok(())
}
