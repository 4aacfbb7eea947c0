use super::hour::{parse_day_from_folder, parse_hour_from_filename};
use super::retention::apply_rolling_retention;
use super::{IngestPlan, LogFile, LogKind, WalkError, WalkErrorKind};
use crate::normalize::hashing::string_hash;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("logs directory '{0}' does not exist")]
    RootMissing(PathBuf),

    #[error("no valid log files found under '{0}'")]
    NoValidFiles(PathBuf),
}

/// Result of walking a log tree: the ingest plan plus every per-file
/// classification failure encountered along the way.
#[derive(Debug)]
pub struct Discovery {
    pub plan: IngestPlan,
    pub errors: Vec<WalkError>,
}

/// Walk `root`, classify every log file, resolve `.log`/`.log.gz` twins,
/// and group survivors into the day/hour/kind plan. When `rolling` is set
/// and the newest discovered day is fresh enough, days older than
/// `retention_days` are dropped from the plan.
pub fn discover(
    root: &Path,
    rolling: bool,
    retention_days: u32,
    today: NaiveDate,
) -> Result<Discovery, DiscoveryError> {
    let meta = std::fs::metadata(root)
        .map_err(|_| DiscoveryError::RootMissing(root.to_path_buf()))?;

    let mut errors = Vec::new();
    let mut classified = Vec::new();

    if meta.is_file() {
        // A single file stands in for a one-element tree
        match classify(root) {
            Ok(file) => classified.push(file),
            Err(kind) => errors.push(WalkError {
                path: root.to_path_buf(),
                kind,
            }),
        }
    } else {
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    errors.push(WalkError {
                        path,
                        kind: WalkErrorKind::UnreadableFile(e.to_string()),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            match classify(entry.path()) {
                Ok(file) => classified.push(file),
                Err(kind) => errors.push(WalkError {
                    path: entry.path().to_path_buf(),
                    kind,
                }),
            }
        }
    }

    let survivors = resolve_gz_twins(classified, &mut errors);

    let mut plan = IngestPlan::default();
    for file in survivors {
        let day = plan.day_mut(file.day);
        let bucket = &mut day.hours[file.hour as usize];
        bucket.by_kind.entry(file.kind).or_default().push(file);
    }
    for day in &mut plan.days {
        for bucket in &mut day.hours {
            for files in bucket.by_kind.values_mut() {
                files.sort_by(|a, b| a.path.cmp(&b.path));
            }
        }
    }

    if rolling {
        let dropped = apply_rolling_retention(&mut plan, today, retention_days);
        for day in dropped {
            debug!(%day, "dropped day outside rolling retention window");
        }
    }

    for err in &errors {
        warn!(path = %err.path.display(), error = %err.kind, "skipped during discovery");
    }

    if plan.file_count() == 0 {
        return Err(DiscoveryError::NoValidFiles(root.to_path_buf()));
    }

    Ok(Discovery { plan, errors })
}

fn classify(path: &Path) -> Result<LogFile, WalkErrorKind> {
    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(WalkErrorKind::IncompatibleExtension)?;

    if !(basename.ends_with(".log") || basename.ends_with(".log.gz")) {
        return Err(WalkErrorKind::IncompatibleExtension);
    }

    let kind = LogKind::from_basename(basename).ok_or(WalkErrorKind::InvalidLogPrefix)?;

    let hour = parse_hour_from_filename(basename).map_err(WalkErrorKind::UnparseableHour)?;

    let day = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(parse_day_from_folder)
        .unwrap_or_else(|| parse_day_from_folder(""));

    let mtime = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| WalkErrorKind::UnreadableFile(e.to_string()))?;

    Ok(LogFile {
        hash: string_hash(&path.to_string_lossy()),
        path: path.to_path_buf(),
        mtime,
        kind,
        day,
        hour,
    })
}

/// When `x.log` and `x.log.gz` both exist, keep the one with the newer
/// mtime and record the loser as a skipped duplicate.
fn resolve_gz_twins(files: Vec<LogFile>, errors: &mut Vec<WalkError>) -> Vec<LogFile> {
    let mut by_stem: HashMap<PathBuf, LogFile> = HashMap::with_capacity(files.len());

    for file in files {
        let stem = match file.path.to_string_lossy().strip_suffix(".gz") {
            Some(s) => PathBuf::from(s),
            None => file.path.clone(),
        };
        match by_stem.entry(stem) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(file);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let keep_new = file.mtime > slot.get().mtime;
                let loser = if keep_new {
                    slot.insert(file)
                } else {
                    file
                };
                errors.push(WalkError {
                    path: loser.path,
                    kind: WalkErrorKind::SkippedDuplicate,
                });
            }
        }
    }

    by_stem.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"#separator \\x09\n").unwrap();
        path
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
    }

    #[test]
    fn test_missing_root_is_fatal() {
        assert!(matches!(
            discover(Path::new("/definitely/not/here"), false, 15, today()),
            Err(DiscoveryError::RootMissing(_))
        ));
    }

    #[test]
    fn test_empty_tree_is_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            discover(dir.path(), false, 15, today()),
            Err(DiscoveryError::NoValidFiles(_))
        ));
    }

    #[test]
    fn test_single_file_root() {
        let dir = TempDir::new().unwrap();
        let path = touch(dir.path(), "conn.log");
        let discovery = discover(&path, false, 15, today()).unwrap();
        assert_eq!(discovery.plan.file_count(), 1);
    }

    #[test]
    fn test_classification_and_grouping() {
        let dir = TempDir::new().unwrap();
        let day_dir = dir.path().join("2024-04-29");
        fs::create_dir(&day_dir).unwrap();
        touch(&day_dir, "conn.00:00:00-01:00:00.log");
        touch(&day_dir, "conn.23:00:00-00:00:00.log");
        touch(&day_dir, "open_conn.00:00:00-01:00:00.log");
        touch(&day_dir, "notes.txt");
        touch(&day_dir, "conn_summary.00:00:00-01:00:00.log");

        let discovery = discover(dir.path(), false, 15, today()).unwrap();
        assert_eq!(discovery.plan.days.len(), 1);

        let day = &discovery.plan.days[0];
        assert_eq!(day.day, NaiveDate::from_ymd_opt(2024, 4, 29).unwrap());
        assert_eq!(day.hours[0].by_kind[&LogKind::Conn].len(), 1);
        assert_eq!(day.hours[0].by_kind[&LogKind::OpenConn].len(), 1);
        assert_eq!(day.hours[23].by_kind[&LogKind::Conn].len(), 1);
        assert!(day.hours[1].is_empty());

        // notes.txt and conn_summary both land in the error list
        assert_eq!(discovery.errors.len(), 2);
        assert!(discovery
            .errors
            .iter()
            .any(|e| matches!(e.kind, WalkErrorKind::IncompatibleExtension)));
        assert!(discovery
            .errors
            .iter()
            .any(|e| matches!(e.kind, WalkErrorKind::InvalidLogPrefix)));
    }

    #[test]
    fn test_gz_twin_resolution_prefers_newer_mtime() {
        let dir = TempDir::new().unwrap();
        let plain = touch(dir.path(), "conn.log");
        let gz = touch(dir.path(), "conn.log.gz");

        // Make the gz copy strictly newer
        let newer = std::time::SystemTime::now() + std::time::Duration::from_secs(60);
        let file = fs::File::options().write(true).open(&gz).unwrap();
        file.set_modified(newer).unwrap();
        drop(file);

        let discovery = discover(dir.path(), false, 15, today()).unwrap();
        assert_eq!(discovery.plan.file_count(), 1);

        let day = &discovery.plan.days[0];
        let kept = &day.hours[0].by_kind[&LogKind::Conn][0];
        assert_eq!(kept.path, gz);

        let dup: Vec<_> = discovery
            .errors
            .iter()
            .filter(|e| matches!(e.kind, WalkErrorKind::SkippedDuplicate))
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].path, plain);
    }

    #[test]
    fn test_multi_day_plan_is_ordered() {
        let dir = TempDir::new().unwrap();
        for date in ["2024-05-01", "2024-04-29"] {
            let day_dir = dir.path().join(date);
            fs::create_dir(&day_dir).unwrap();
            touch(&day_dir, "dns.00:00:00-01:00:00.log");
            touch(&day_dir, "dns.23:00:00-00:00:00.log");
        }
        let discovery = discover(dir.path(), false, 15, today()).unwrap();
        let days: Vec<NaiveDate> = discovery.plan.days.iter().map(|d| d.day).collect();
        assert_eq!(
            days,
            vec![
                NaiveDate::from_ymd_opt(2024, 4, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            ]
        );
        // Exactly hours 0 and 23 are populated for each day
        for day in &discovery.plan.days {
            let populated: Vec<usize> = day
                .hours
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, _)| i)
                .collect();
            assert_eq!(populated, vec![0, 23]);
        }
    }

    #[test]
    fn test_undated_folder_collapses_to_sentinel() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("zeek-logs");
        fs::create_dir(&sub).unwrap();
        touch(&sub, "http.log");
        let discovery = discover(dir.path(), false, 15, today()).unwrap();
        assert_eq!(
            discovery.plan.days[0].day,
            NaiveDate::from_ymd_opt(2006, 1, 2).unwrap()
        );
    }
}
