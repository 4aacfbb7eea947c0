use crate::config::load_config;
use crate::storage::{Catalog, ColumnStore};
use chrono::DateTime;
use std::path::PathBuf;

fn format_ts(ts: Option<i64>) -> String {
    match ts.and_then(|t| DateTime::from_timestamp(t, 0)) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "-".to_string(),
    }
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path.as_deref())?;

    let store = ColumnStore::open(&config.storage.path)?;
    store.init().await?;
    let catalog = Catalog::new(store);

    let databases = catalog.list_databases().await?;
    if databases.is_empty() {
        println!("no databases");
        return Ok(());
    }

    println!("{:<32} {:>8} {:>20} {:>20}", "NAME", "ROLLING", "OLDEST", "NEWEST");
    for db in databases {
        println!(
            "{:<32} {:>8} {:>20} {:>20}",
            db.name,
            if db.rolling { "yes" } else { "no" },
            format_ts(db.min_ts),
            format_ts(db.max_ts),
        );
    }
    Ok(())
}
