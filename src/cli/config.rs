use crate::config::generate::generate_starter_config;
use std::path::PathBuf;

/// Write (or print) a starter configuration file.
pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let content = generate_starter_config();

    if stdout {
        print!("{content}");
        return Ok(());
    }

    let target: PathBuf = match dirs::home_dir() {
        Some(home) => home.join(".config/stakeout/config.yml"),
        None => PathBuf::from("/etc/stakeout/config.yml"),
    };

    if target.exists() {
        return Err(format!("refusing to overwrite existing config at {}", target.display()).into());
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, content)?;
    println!("wrote starter config to {}", target.display());
    Ok(())
}
