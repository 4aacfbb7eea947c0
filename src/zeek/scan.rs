use super::fields::{decode_field, decode_json_field, FieldError, FieldSpec};
use super::header::{read_header, HeaderError, LogFormat, ZeekHeader};
use super::records::ZeekRecord;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Malformed lines tolerated per file before it is abandoned.
pub const MALFORMED_LINE_BUDGET: u32 = 25;

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;
const MAX_LINE_LEN: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("file truncated: last line incomplete")]
    Truncated,

    #[error("{0} malformed lines, file potentially corrupted")]
    TooManyBadLines(u32),
}

#[derive(Debug, Error)]
enum LineError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("line exceeds {0} bytes")]
    TooLong(usize),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("invalid JSON record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Single-pass, pull-style record scanner over one Zeek log file.
///
/// Gzip is selected from the `.gz` extension. The header is consumed at
/// open; `next_record` then yields typed records until EOF, tolerating up
/// to [`MALFORMED_LINE_BUDGET`] bad lines.
pub struct Scanner<R: ZeekRecord> {
    reader: BufReader<Box<dyn Read + Send>>,
    header: ZeekHeader,
    slots: Vec<Option<FieldSpec>>,
    source: Arc<str>,
    pending: Option<(String, bool)>,
    line: String,
    bad_lines: u32,
    records: u64,
    _kind: PhantomData<R>,
}

impl<R: ZeekRecord> Scanner<R> {
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let file = File::open(path)?;
        let gz = path.extension().and_then(|e| e.to_str()) == Some("gz");
        let raw: Box<dyn Read + Send> = if gz {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut reader = BufReader::with_capacity(INITIAL_BUFFER_CAPACITY, raw);

        let (header, pending) = read_header(&mut reader)?;
        let slots = header.slot_map::<R>();

        Ok(Self {
            reader,
            header,
            slots,
            source: Arc::from(path.to_string_lossy().as_ref()),
            pending,
            line: String::with_capacity(INITIAL_BUFFER_CAPACITY),
            bad_lines: 0,
            records: 0,
            _kind: PhantomData,
        })
    }

    pub fn header(&self) -> &ZeekHeader {
        &self.header
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn bad_lines(&self) -> u32 {
        self.bad_lines
    }

    /// Pull the next record, skipping comments, blanks, and (within
    /// budget) malformed lines.
    pub fn next_record(&mut self) -> Result<Option<R>, ScanError> {
        loop {
            let terminated = if let Some((text, terminated)) = self.pending.take() {
                self.line.clear();
                self.line.push_str(&text);
                terminated
            } else {
                self.line.clear();
                if self.reader.read_line(&mut self.line)? == 0 {
                    return Ok(None);
                }
                let terminated = self.line.ends_with('\n');
                while self.line.ends_with('\n') || self.line.ends_with('\r') {
                    self.line.pop();
                }
                terminated
            };

            if self.line.is_empty() {
                continue;
            }
            if self.header.format == LogFormat::Tsv && self.line.starts_with('#') {
                continue;
            }

            let parsed = if self.line.len() > MAX_LINE_LEN {
                Err(LineError::TooLong(MAX_LINE_LEN))
            } else {
                match self.header.format {
                    LogFormat::Tsv => parse_tsv_line::<R>(&self.header, &self.slots, &self.line),
                    LogFormat::Json => parse_json_line::<R>(&self.line),
                }
            };

            match parsed {
                Ok(mut record) => {
                    record.set_source(&self.source);
                    self.records += 1;
                    return Ok(Some(record));
                }
                Err(err) => {
                    debug!(source = %self.source, error = %err, "malformed line");
                    // An unparseable final line with no newline is a cut-off
                    // file, not a corrupt one
                    if !terminated {
                        return Err(ScanError::Truncated);
                    }
                    self.bad_lines += 1;
                    if self.bad_lines > MALFORMED_LINE_BUDGET {
                        return Err(ScanError::TooManyBadLines(self.bad_lines));
                    }
                }
            }
        }
    }
}

fn parse_tsv_line<R: ZeekRecord>(
    header: &ZeekHeader,
    slots: &[Option<FieldSpec>],
    line: &str,
) -> Result<R, LineError> {
    let mut record = R::default();
    let mut count = 0;

    for (idx, raw) in line.split(header.separator).enumerate() {
        count += 1;
        let Some(Some(spec)) = slots.get(idx) else {
            continue;
        };
        if let Some(value) = decode_field(
            spec.ty,
            raw,
            &header.set_separator,
            &header.unset_field,
            &header.empty_field,
        )? {
            record.set_field(spec.slot, value);
        }
    }

    if count != slots.len() {
        return Err(LineError::FieldCount {
            expected: slots.len(),
            found: count,
        });
    }

    Ok(record)
}

fn parse_json_line<R: ZeekRecord>(line: &str) -> Result<R, LineError> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(line)?;
    let mut record = R::default();

    for spec in R::FIELDS {
        if let Some(value) = map.get(spec.name) {
            if let Some(decoded) = decode_json_field(spec.ty, value)? {
                record.set_field(spec.slot, decoded);
            }
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zeek::records::{ConnRecord, DnsRecord};
    use std::io::Write;
    use tempfile::TempDir;

    const CONN_LOG: &str = "\
#separator \\x09
#set_separator\t,
#empty_field\t(empty)
#unset_field\t-
#path\tconn
#fields\tts\tuid\tid.orig_h\tid.orig_p\tid.resp_h\tid.resp_p\tproto\tservice\tduration\torig_bytes\tresp_bytes\tconn_state\torig_pkts\tresp_pkts
#types\ttime\tstring\taddr\tport\taddr\tport\tenum\tstring\tinterval\tcount\tcount\tstring\tcount\tcount
1721649600.306335\tCAbc1\t10.0.0.5\t50000\t93.184.216.34\t443\ttcp\tssl\t1.5\t1024\t4096\tSF\t10\t12
1721649601.000000\tCAbc2\t10.0.0.6\t50001\t93.184.216.34\t80\ttcp\thttp\t-\t-\t-\tS0\t1\t0
";

    fn write_log(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn write_gz_log(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let path = dir.path().join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut enc = GzEncoder::new(file, Compression::default());
        enc.write_all(content.as_bytes()).unwrap();
        enc.finish().unwrap();
        path
    }

    #[test]
    fn test_scan_tsv_conn_log() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "conn.log", CONN_LOG);
        let mut scanner: Scanner<ConnRecord> = Scanner::open(&path).unwrap();

        let first = scanner.next_record().unwrap().unwrap();
        assert_eq!(first.ts, 1721649600);
        assert_eq!(first.uid, "CAbc1");
        assert_eq!(first.orig_h, "10.0.0.5");
        assert_eq!(first.resp_p, 443);
        assert_eq!(first.orig_bytes, 1024);
        assert_eq!(first.conn_state, "SF");
        assert_eq!(first.source.as_deref(), Some(path.to_str().unwrap()));

        // Unset fields keep their zero values
        let second = scanner.next_record().unwrap().unwrap();
        assert_eq!(second.duration, 0.0);
        assert_eq!(second.orig_bytes, 0);

        assert!(scanner.next_record().unwrap().is_none());
        assert_eq!(scanner.records(), 2);
        assert_eq!(scanner.bad_lines(), 0);
    }

    #[test]
    fn test_scan_gzip_log() {
        let dir = TempDir::new().unwrap();
        let path = write_gz_log(&dir, "conn.log.gz", CONN_LOG);
        let mut scanner: Scanner<ConnRecord> = Scanner::open(&path).unwrap();
        assert!(scanner.next_record().unwrap().is_some());
        assert!(scanner.next_record().unwrap().is_some());
        assert!(scanner.next_record().unwrap().is_none());
    }

    #[test]
    fn test_malformed_lines_within_budget() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from(
            "#separator \\x09\n#fields\tts\tuid\n#types\ttime\tstring\n",
        );
        content.push_str("not-a-time\tCAbc\n");
        content.push_str("1721649600.0\tCDef\n");
        let path = write_log(&dir, "conn.log", &content);

        let mut scanner: Scanner<ConnRecord> = Scanner::open(&path).unwrap();
        let record = scanner.next_record().unwrap().unwrap();
        assert_eq!(record.uid, "CDef");
        assert_eq!(scanner.bad_lines(), 1);
    }

    #[test]
    fn test_budget_exhaustion_abandons_file() {
        let dir = TempDir::new().unwrap();
        let mut content = String::from(
            "#separator \\x09\n#fields\tts\tuid\n#types\ttime\tstring\n",
        );
        for _ in 0..(MALFORMED_LINE_BUDGET + 1) {
            content.push_str("garbage-line\twith\textra\tfields\n");
        }
        let path = write_log(&dir, "conn.log", &content);

        let mut scanner: Scanner<ConnRecord> = Scanner::open(&path).unwrap();
        assert!(matches!(
            scanner.next_record(),
            Err(ScanError::TooManyBadLines(_))
        ));
    }

    #[test]
    fn test_truncated_final_line() {
        let dir = TempDir::new().unwrap();
        let content = "#separator \\x09\n#fields\tts\tuid\n#types\ttime\tstring\n1721649600.0\tCAbc\n1721649601.0\tCDe";
        let path = write_log(&dir, "conn.log", content);

        let mut scanner: Scanner<ConnRecord> = Scanner::open(&path).unwrap();
        assert!(scanner.next_record().unwrap().is_some());
        assert!(matches!(scanner.next_record(), Err(ScanError::Truncated)));
    }

    #[test]
    fn test_trailing_comment_is_skipped() {
        let dir = TempDir::new().unwrap();
        let content = "#separator \\x09\n#fields\tts\tuid\n#types\ttime\tstring\n1721649600.0\tCAbc\n#close\t2024-07-22-13-00-00\n";
        let path = write_log(&dir, "conn.log", content);

        let mut scanner: Scanner<ConnRecord> = Scanner::open(&path).unwrap();
        assert!(scanner.next_record().unwrap().is_some());
        assert!(scanner.next_record().unwrap().is_none());
    }

    #[test]
    fn test_scan_json_dns_log() {
        let dir = TempDir::new().unwrap();
        let content = concat!(
            "{\"ts\":1721649600.25,\"uid\":\"CDns1\",\"id.orig_h\":\"10.0.0.5\",\"id.orig_p\":5353,",
            "\"id.resp_h\":\"8.8.8.8\",\"id.resp_p\":53,\"proto\":\"udp\",\"query\":\"example.com\",",
            "\"qtype_name\":\"A\",\"answers\":[\"93.184.216.34\"],\"TTLs\":[300.0]}\n",
        );
        let path = write_log(&dir, "dns.log", content);

        let mut scanner: Scanner<DnsRecord> = Scanner::open(&path).unwrap();
        let record = scanner.next_record().unwrap().unwrap();
        assert_eq!(record.ts, 1721649600);
        assert_eq!(record.query, "example.com");
        assert_eq!(record.qtype_name, "A");
        assert_eq!(record.answers, vec!["93.184.216.34".to_string()]);
        assert_eq!(record.ttls, vec![300.0]);
        assert!(scanner.next_record().unwrap().is_none());
    }
}
