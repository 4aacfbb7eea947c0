use super::types::Config;
use crate::config::expand_tilde;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Load a config file, or fall back to defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Ok(Config::default());
    };

    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        ))
    })?;

    config.storage.path = expand_tilde(&config.storage.path);

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.import.retention_days == 0 {
        return Err(ConfigError::Validation(
            "import.retention_days must be at least 1".to_string(),
        ));
    }
    if config.import.writer_rate_limit == 0 {
        return Err(ConfigError::Validation(
            "import.writer_rate_limit must be at least 1".to_string(),
        ));
    }
    if config.import.http_requests_per_uid == 0 {
        return Err(ConfigError::Validation(
            "import.http_requests_per_uid must be at least 1".to_string(),
        ));
    }
    if config.import.batch_size == 0 {
        return Err(ConfigError::Validation(
            "import.batch_size must be at least 1".to_string(),
        ));
    }
    for domain in config
        .filtering
        .always_include_domains
        .iter()
        .chain(&config.filtering.never_include_domains)
    {
        if domain.is_empty() || domain.trim_start_matches("*.").is_empty() {
            return Err(ConfigError::Validation(format!(
                "invalid domain filter entry '{}'",
                domain
            )));
        }
    }
    Ok(())
}
