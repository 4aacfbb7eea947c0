use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HourParseError {
    #[error("no recognizable hour in filename '{0}'")]
    Format(String),

    #[error("hour {0} out of range")]
    Range(u32),
}

/// Filenames either carry a rotation timestamp (`conn.14:00:00-15:00:00.log.gz`,
/// `conn_20240722_12:00:00-13:00:00+0000`) or no timestamp at all (`conn.log`,
/// meaning hour 0).
fn dated_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[._/:]\d{8}[._/:](\d{1,2})[:/_]\d{2}").expect("static regex"))
}

fn rotation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.(\d{1,2})[:/_]\d{2}").expect("static regex"))
}

/// Parse the hour-of-day a log file covers from its basename.
pub fn parse_hour_from_filename(name: &str) -> Result<u8, HourParseError> {
    let stem = name.strip_suffix(".gz").unwrap_or(name);
    let stem = stem.strip_suffix(".log").unwrap_or(stem);

    let captured = dated_pattern()
        .captures(stem)
        .or_else(|| rotation_pattern().captures(stem))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().parse::<u32>().expect("digit capture"));

    match captured {
        Some(hour) if hour <= 23 => Ok(hour as u8),
        Some(hour) => Err(HourParseError::Range(hour)),
        // A colon means the name carries a timestamp we could not read.
        None if stem.contains(':') => Err(HourParseError::Format(name.to_string())),
        None => Ok(0),
    }
}

/// Sentinel used when the parent folder carries no date. Collapses undated
/// trees into a single logical day.
pub const UNDATED_DAY: &str = "2006-01-02";

/// Parse the logical day from the immediate parent directory name.
pub fn parse_day_from_folder(name: &str) -> NaiveDate {
    NaiveDate::parse_from_str(name, "%Y-%m-%d")
        .unwrap_or_else(|_| UNDATED_DAY.parse().expect("static sentinel date"))
}
