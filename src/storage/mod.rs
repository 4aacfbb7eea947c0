pub mod catalog;
pub mod rows;
pub mod schema;
pub mod store;
pub mod writer;

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

pub use catalog::{Catalog, DatabaseInfo};
pub use store::ColumnStore;
pub use writer::{flush_limiter, FlushLimiter, TableWriter};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] duckdb::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("invalid database name '{0}'")]
    InvalidDatabaseName(String),

    #[error("wildcards may only lead or trail the pattern")]
    InteriorWildcard,

    #[error("pattern is empty once wildcards are trimmed")]
    TrimmedNameEmpty,

    #[error("writer channel closed before shutdown")]
    ChannelClosed,
}

/// Names reserved by the store itself.
const RESERVED_NAMES: [&str; 4] = ["default", "system", "information_schema", "metadatabase"];

const MAX_NAME_LEN: usize = 63;

fn name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][A-Za-z0-9_]*[A-Za-z0-9]$").expect("static regex"))
}

/// Validate a user-supplied database name before it is ever spliced into
/// SQL or recorded in the catalog.
pub fn validate_database_name(name: &str) -> Result<(), StorageError> {
    if name.len() > MAX_NAME_LEN
        || RESERVED_NAMES.contains(&name)
        || !name_pattern().is_match(name)
    {
        return Err(StorageError::InvalidDatabaseName(name.to_string()));
    }
    Ok(())
}

/// How a trimmed wildcard pattern matches database names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    pub stem: String,
    pub leading: bool,
    pub trailing: bool,
}

impl WildcardPattern {
    pub fn matches(&self, name: &str) -> bool {
        match (self.leading, self.trailing) {
            (true, true) => name.contains(&self.stem),
            (true, false) => name.ends_with(&self.stem),
            (false, true) => name.starts_with(&self.stem),
            (false, false) => name == self.stem,
        }
    }
}

/// Strip leading/trailing `*` from a delete pattern. Interior wildcards
/// and patterns that trim away to nothing are rejected.
pub fn trim_wildcards(pattern: &str) -> Result<WildcardPattern, StorageError> {
    let leading = pattern.starts_with('*');
    let trailing = pattern.len() > 1 && pattern.ends_with('*');
    let stem = pattern.trim_matches('*');

    if stem.contains('*') {
        return Err(StorageError::InteriorWildcard);
    }
    if stem.is_empty() {
        return Err(StorageError::TrimmedNameEmpty);
    }

    Ok(WildcardPattern {
        stem: stem.to_string(),
        leading,
        trailing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_well_formed_names() {
        for name in ["dnscat2_ja3_strobe", "combined__0000_rolling", "vsagent"] {
            assert!(validate_database_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejects_malformed_names() {
        for name in ["2024", "Vsagent", "_vsagent", "dnscat2_", "dns-cat", "default"] {
            assert!(validate_database_name(name).is_err(), "{name}");
        }
        let too_long = format!("a{}", "b".repeat(63));
        assert!(validate_database_name(&too_long).is_err());
    }

    #[test]
    fn test_rejects_reserved_names() {
        for name in RESERVED_NAMES {
            assert!(validate_database_name(name).is_err(), "{name}");
        }
    }

    #[test]
    fn test_trim_wildcards() {
        let p = trim_wildcards("*bing*").unwrap();
        assert_eq!(p.stem, "bing");
        assert!(p.leading && p.trailing);
        assert!(p.matches("dobingdo"));

        let p = trim_wildcards("bing*").unwrap();
        assert!(!p.leading && p.trailing);
        assert!(p.matches("bingo"));
        assert!(!p.matches("obingo"));

        let p = trim_wildcards("*bing").unwrap();
        assert!(p.matches("webing"));
        assert!(!p.matches("bingo"));

        let p = trim_wildcards("bing").unwrap();
        assert!(p.matches("bing"));
        assert!(!p.matches("bingo"));
    }

    #[test]
    fn test_trim_wildcards_failures() {
        assert!(matches!(
            trim_wildcards("*"),
            Err(StorageError::TrimmedNameEmpty)
        ));
        assert!(matches!(
            trim_wildcards("**"),
            Err(StorageError::TrimmedNameEmpty)
        ));
        assert!(matches!(
            trim_wildcards("bi*ng"),
            Err(StorageError::InteriorWildcard)
        ));
    }
}
