use thiserror::Error;

/// Zeek's field type vocabulary, as written in `#types` directives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeekType {
    Time,
    Interval,
    String,
    Enum,
    Addr,
    Count,
    Port,
    Bool,
    SetString,
    SetEnum,
    VectorString,
    VectorInterval,
}

impl ZeekType {
    /// Unknown type names map to `None` and the field is ignored.
    pub fn parse(name: &str) -> Option<ZeekType> {
        match name {
            "time" => Some(ZeekType::Time),
            "interval" => Some(ZeekType::Interval),
            "string" => Some(ZeekType::String),
            "enum" => Some(ZeekType::Enum),
            "addr" => Some(ZeekType::Addr),
            "count" => Some(ZeekType::Count),
            "port" => Some(ZeekType::Port),
            "bool" => Some(ZeekType::Bool),
            "set[string]" => Some(ZeekType::SetString),
            "set[enum]" => Some(ZeekType::SetEnum),
            "vector[string]" => Some(ZeekType::VectorString),
            "vector[interval]" => Some(ZeekType::VectorInterval),
            _ => None,
        }
    }
}

/// A decoded field value on its way into a typed record slot.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Time(i64),
    Interval(f64),
    Count(u64),
    Port(u16),
    Bool(bool),
    Str(String),
    StrList(Vec<String>),
    IntervalList(Vec<f64>),
}

/// Maps one Zeek header field onto a record slot.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: ZeekType,
    pub slot: usize,
}

#[derive(Debug, Clone, Error)]
pub enum FieldError {
    #[error("invalid {ty:?} value '{value}'")]
    Invalid { ty: ZeekType, value: String },
}

fn invalid(ty: ZeekType, value: &str) -> FieldError {
    FieldError::Invalid {
        ty,
        value: value.to_string(),
    }
}

/// Decode one TSV field. `None` means the field was unset or empty and the
/// slot keeps its zero value.
pub fn decode_field(
    ty: ZeekType,
    raw: &str,
    set_separator: &str,
    unset_field: &str,
    empty_field: &str,
) -> Result<Option<FieldValue>, FieldError> {
    if raw == unset_field || raw == empty_field {
        return Ok(None);
    }

    let value = match ty {
        ZeekType::Time => FieldValue::Time(decode_time(raw).ok_or_else(|| invalid(ty, raw))?),
        ZeekType::Interval => {
            FieldValue::Interval(raw.parse::<f64>().map_err(|_| invalid(ty, raw))?)
        }
        ZeekType::Count => FieldValue::Count(raw.parse::<u64>().map_err(|_| invalid(ty, raw))?),
        ZeekType::Port => FieldValue::Port(raw.parse::<u16>().map_err(|_| invalid(ty, raw))?),
        ZeekType::Bool => FieldValue::Bool(decode_bool(raw).ok_or_else(|| invalid(ty, raw))?),
        ZeekType::String | ZeekType::Enum | ZeekType::Addr => FieldValue::Str(raw.to_string()),
        ZeekType::SetString | ZeekType::SetEnum | ZeekType::VectorString => FieldValue::StrList(
            raw.split(set_separator)
                .filter(|s| *s != unset_field && *s != empty_field)
                .map(str::to_string)
                .collect(),
        ),
        ZeekType::VectorInterval => {
            let mut values = Vec::new();
            for part in raw.split(set_separator) {
                if part == unset_field || part == empty_field {
                    continue;
                }
                values.push(part.parse::<f64>().map_err(|_| invalid(ty, part))?);
            }
            FieldValue::IntervalList(values)
        }
    };

    Ok(Some(value))
}

/// Decode one field from a JSON-format log line.
pub fn decode_json_field(
    ty: ZeekType,
    value: &serde_json::Value,
) -> Result<Option<FieldValue>, FieldError> {
    use serde_json::Value;

    if value.is_null() {
        return Ok(None);
    }
    let fail = || invalid(ty, &value.to_string());

    let decoded = match ty {
        ZeekType::Time => match value {
            Value::Number(n) => FieldValue::Time(n.as_f64().ok_or_else(fail)? as i64),
            Value::String(s) => FieldValue::Time(decode_time(s).ok_or_else(fail)?),
            _ => return Err(fail()),
        },
        ZeekType::Interval => FieldValue::Interval(value.as_f64().ok_or_else(fail)?),
        ZeekType::Count => FieldValue::Count(value.as_u64().ok_or_else(fail)?),
        ZeekType::Port => {
            let port = value.as_u64().ok_or_else(fail)?;
            FieldValue::Port(u16::try_from(port).map_err(|_| fail())?)
        }
        ZeekType::Bool => FieldValue::Bool(value.as_bool().ok_or_else(fail)?),
        ZeekType::String | ZeekType::Enum | ZeekType::Addr => {
            FieldValue::Str(value.as_str().ok_or_else(fail)?.to_string())
        }
        ZeekType::SetString | ZeekType::SetEnum | ZeekType::VectorString => {
            let items = value.as_array().ok_or_else(fail)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(item.as_str().ok_or_else(fail)?.to_string());
            }
            FieldValue::StrList(out)
        }
        ZeekType::VectorInterval => {
            let items = value.as_array().ok_or_else(fail)?;
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(item.as_f64().ok_or_else(fail)?);
            }
            FieldValue::IntervalList(out)
        }
    };

    Ok(Some(decoded))
}

/// Zeek timestamps are epoch seconds with a fractional part. The pipeline
/// keys on whole seconds.
fn decode_time(raw: &str) -> Option<i64> {
    let (secs, frac) = match raw.split_once('.') {
        Some((s, f)) => (s, f),
        None => (raw, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    if !frac.is_empty() && !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(secs)
}

fn decode_bool(raw: &str) -> Option<bool> {
    match raw {
        "T" | "true" => Some(true),
        "F" | "false" => Some(false),
        _ => None,
    }
}
