use crate::config::load_config;
use crate::storage::{trim_wildcards, validate_database_name, Catalog, ColumnStore};
use std::path::PathBuf;

/// Delete one database by name, or several by leading/trailing wildcard.
pub async fn run(
    config_path: Option<PathBuf>,
    name: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path.as_deref())?;

    let store = ColumnStore::open(&config.storage.path)?;
    store.init().await?;
    let catalog = Catalog::new(store);

    if name.contains('*') {
        let pattern = trim_wildcards(&name)?;
        let dropped = catalog.drop_matching(&pattern).await?;
        println!("deleted {dropped} database(s) matching '{name}'");
    } else {
        validate_database_name(&name)?;
        if catalog.database_rolling(&name).await?.is_none() {
            println!("database '{name}' does not exist");
            return Ok(());
        }
        catalog.drop_database(&name).await?;
        println!("deleted database '{name}'");
    }
    Ok(())
}
