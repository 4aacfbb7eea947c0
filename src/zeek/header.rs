use super::fields::{FieldSpec, ZeekType};
use super::records::ZeekRecord;
use std::io::BufRead;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown file type (neither Zeek TSV nor JSON)")]
    UnknownFileType,

    #[error("truncated header (no #fields directive)")]
    TruncatedHeader,

    #[error("header declares {fields} fields but {types} types")]
    FieldTypeMismatch { fields: usize, types: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Tsv,
    Json,
}

/// Parsed Zeek log header. Lives for the duration of one file parse.
#[derive(Debug, Clone)]
pub struct ZeekHeader {
    pub format: LogFormat,
    pub separator: char,
    pub set_separator: String,
    pub empty_field: String,
    pub unset_field: String,
    pub path: Option<String>,
    pub open: Option<String>,
    pub field_names: Vec<String>,
    pub field_types: Vec<String>,
}

impl Default for ZeekHeader {
    fn default() -> Self {
        Self {
            format: LogFormat::Tsv,
            separator: '\t',
            set_separator: ",".to_string(),
            empty_field: "(empty)".to_string(),
            unset_field: "-".to_string(),
            path: None,
            open: None,
            field_names: Vec::new(),
            field_types: Vec::new(),
        }
    }
}

impl ZeekHeader {
    /// True when the `#path` directive agrees with the prefix the file was
    /// classified under. A mismatch is worth a warning, nothing more.
    pub fn path_matches(&self, expected: &str) -> bool {
        match &self.path {
            Some(path) => path == expected,
            None => true,
        }
    }

    /// Build the header-column → record-slot permutation. Columns naming
    /// fields the record does not declare map to `None` and are skipped
    /// while parsing, as are columns whose declared type disagrees.
    pub fn slot_map<R: ZeekRecord>(&self) -> Vec<Option<FieldSpec>> {
        self.field_names
            .iter()
            .zip(self.field_types.iter())
            .map(|(name, ty)| {
                let ty = ZeekType::parse(ty)?;
                R::FIELDS
                    .iter()
                    .find(|spec| spec.name == name && spec.ty == ty)
                    .copied()
            })
            .collect()
    }
}

/// Detect the log format and consume TSV header directives.
///
/// Returns the header and, for JSON logs (whose first line is already
/// data) or TSV logs (whose first non-directive line is), the first data
/// line so the scanner does not lose it. The boolean records whether that
/// line ended in a newline, which truncation detection needs.
pub fn read_header<R: BufRead>(
    reader: &mut R,
) -> Result<(ZeekHeader, Option<(String, bool)>), HeaderError> {
    let mut line = String::new();

    // Find the first non-empty line to detect the format
    let (first, first_terminated) = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(HeaderError::UnknownFileType);
        }
        let terminated = line.ends_with('\n');
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if !trimmed.is_empty() {
            break (trimmed.to_string(), terminated);
        }
    };

    if first.starts_with('{') {
        let parsed: Result<serde_json::Map<String, serde_json::Value>, _> =
            serde_json::from_str(&first);
        if parsed.is_ok() {
            let header = ZeekHeader {
                format: LogFormat::Json,
                ..ZeekHeader::default()
            };
            return Ok((header, Some((first, first_terminated))));
        }
        return Err(HeaderError::UnknownFileType);
    }

    if !first.starts_with('#') {
        return Err(HeaderError::UnknownFileType);
    }

    let mut header = ZeekHeader::default();
    apply_directive(&mut header, &first);

    let first_data = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break None;
        }
        let terminated = line.ends_with('\n');
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.starts_with('#') {
            apply_directive(&mut header, trimmed);
        } else {
            break Some((trimmed.to_string(), terminated));
        }
    };

    if header.field_names.len() != header.field_types.len() {
        return Err(HeaderError::FieldTypeMismatch {
            fields: header.field_names.len(),
            types: header.field_types.len(),
        });
    }
    if header.field_names.is_empty() {
        return Err(HeaderError::TruncatedHeader);
    }

    Ok((header, first_data))
}

fn apply_directive(header: &mut ZeekHeader, line: &str) {
    // The separator directive is itself space-separated, since the
    // separator is not known until it has been read.
    if let Some(value) = line.strip_prefix("#separator ") {
        header.separator = decode_separator(value.trim());
        return;
    }

    let Some(body) = line.strip_prefix('#') else {
        return;
    };
    let Some((name, value)) = body.split_once(header.separator) else {
        return;
    };

    match name {
        "set_separator" => header.set_separator = value.to_string(),
        "empty_field" => header.empty_field = value.to_string(),
        "unset_field" => header.unset_field = value.to_string(),
        "path" => header.path = Some(value.to_string()),
        "open" => header.open = Some(value.to_string()),
        "fields" => {
            header.field_names = value
                .split(header.separator)
                .map(str::to_string)
                .collect();
        }
        "types" => {
            header.field_types = value
                .split(header.separator)
                .map(str::to_string)
                .collect();
        }
        // #close and anything else Zeek may add
        _ => {}
    }
}

/// Separators are written hex-escaped (`\x09`); a bare character is also
/// accepted.
fn decode_separator(value: &str) -> char {
    if let Some(hex) = value.strip_prefix("\\x") {
        if let Ok(byte) = u8::from_str_radix(hex, 16) {
            return byte as char;
        }
    }
    value.chars().next().unwrap_or('\t')
}
