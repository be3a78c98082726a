//! Deterministic CSV bar loader.
//!
//! Required columns: `instrument_id`, `datetime` (RFC3339), `open`, `high`,
//! `low`, `close`, `volume` (all price fields in micros).
//!
//! Optional columns: `limit_up` (default `i64::MAX`, i.e. no limit),
//! `limit_down` (default `i64::MIN`), `is_nan` (default `false`).
//! `status` is derived: `close == limit_up` => `LimitUp`, `close ==
//! limit_down` => `LimitDown`, otherwise `Ok`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use mqk_schemas::{Bar, BarStatus, InstrumentId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    EmptyInput,
    MissingHeader(&'static str),
    ParseInt { column: String, value: String },
    ParseBool { column: String, value: String },
    ParseDateTime { column: String, value: String },
    BadRow { line: usize, reason: String },
    Io(String),
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e.to_string())
    }
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::EmptyInput => write!(f, "empty input"),
            LoadError::MissingHeader(h) => write!(f, "missing header: {}", h),
            LoadError::ParseInt { column, value } => write!(f, "failed to parse int in column {}: {}", column, value),
            LoadError::ParseBool { column, value } => write!(f, "failed to parse bool in column {}: {}", column, value),
            LoadError::ParseDateTime { column, value } => {
                write!(f, "failed to parse datetime in column {}: {}", column, value)
            }
            LoadError::BadRow { line, reason } => write!(f, "bad row at line {}: {}", line, reason),
            LoadError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Load one instrument's bars from a CSV file and group them by
/// `datetime`, producing a `BTreeMap<InstrumentId, Bar>` per distinct
/// timestamp — the shape [`crate::driver::TradingDay::bars`] expects.
pub fn load_csv_file(path: impl AsRef<Path>) -> Result<BTreeMap<chrono::DateTime<chrono::Utc>, BTreeMap<InstrumentId, Bar>>, LoadError> {
    let s = fs::read_to_string(path)?;
    parse_csv_bars(&s)
}

pub fn parse_csv_bars(
    csv: &str,
) -> Result<BTreeMap<chrono::DateTime<chrono::Utc>, BTreeMap<InstrumentId, Bar>>, LoadError> {
    let mut lines = csv.lines();

    let header_line = lines.next().ok_or(LoadError::EmptyInput)?;
    let header_line = header_line.trim().trim_start_matches('\u{feff}');
    if header_line.is_empty() {
        return Err(LoadError::EmptyInput);
    }

    let headers: Vec<String> = split_csv_line(header_line).into_iter().map(|s| s.trim().to_string()).collect();
    let mut idx: BTreeMap<String, usize> = BTreeMap::new();
    for (i, h) in headers.iter().enumerate() {
        idx.insert(h.clone(), i);
    }

    let col_instrument = find_required(&idx, "instrument_id")?;
    let col_datetime = find_required(&idx, "datetime")?;
    let col_open = find_required(&idx, "open")?;
    let col_high = find_required(&idx, "high")?;
    let col_low = find_required(&idx, "low")?;
    let col_close = find_required(&idx, "close")?;
    let col_volume = find_required(&idx, "volume")?;

    let col_limit_up = idx.get("limit_up").copied();
    let col_limit_down = idx.get("limit_down").copied();
    let col_is_nan = idx.get("is_nan").copied();

    let mut out: BTreeMap<chrono::DateTime<chrono::Utc>, BTreeMap<InstrumentId, Bar>> = BTreeMap::new();

    for (line_idx0, raw) in lines.enumerate() {
        let line_no = line_idx0 + 2;
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }

        let fields = split_csv_line(raw);
        let get = |col: usize| -> Result<&str, LoadError> {
            fields.get(col).map(|s| s.as_str()).ok_or_else(|| LoadError::BadRow {
                line: line_no,
                reason: format!("missing column index {col}"),
            })
        };

        let instrument_id = get(col_instrument)?.trim().to_string();
        if instrument_id.is_empty() {
            return Err(LoadError::BadRow { line: line_no, reason: "instrument_id is empty".into() });
        }
        let datetime = parse_datetime(get(col_datetime)?, "datetime")?;
        let open = parse_i64(get(col_open)?, "open")?;
        let high = parse_i64(get(col_high)?, "high")?;
        let low = parse_i64(get(col_low)?, "low")?;
        let close = parse_i64(get(col_close)?, "close")?;
        let volume = parse_i64(get(col_volume)?, "volume")?;

        let limit_up = match col_limit_up {
            Some(c) => parse_i64(get(c)?, "limit_up")?,
            None => i64::MAX,
        };
        let limit_down = match col_limit_down {
            Some(c) => parse_i64(get(c)?, "limit_down")?,
            None => i64::MIN,
        };
        let is_nan = match col_is_nan {
            Some(c) => parse_bool(get(c)?, "is_nan")?,
            None => false,
        };

        let status = if close >= limit_up {
            BarStatus::LimitUp
        } else if close <= limit_down {
            BarStatus::LimitDown
        } else {
            BarStatus::Ok
        };

        let bar = Bar {
            instrument_id: instrument_id.clone(),
            datetime,
            open,
            high,
            low,
            close,
            volume,
            limit_up,
            limit_down,
            status,
            is_nan,
        };

        out.entry(datetime).or_default().insert(instrument_id, bar);
    }

    if out.is_empty() {
        return Err(LoadError::EmptyInput);
    }
    Ok(out)
}

fn find_required(idx: &BTreeMap<String, usize>, name: &'static str) -> Result<usize, LoadError> {
    idx.get(name).copied().ok_or(LoadError::MissingHeader(name))
}

fn parse_i64(s: &str, col: &str) -> Result<i64, LoadError> {
    let t = s.trim();
    t.parse::<i64>().map_err(|_| LoadError::ParseInt { column: col.to_string(), value: t.to_string() })
}

fn parse_bool(s: &str, col: &str) -> Result<bool, LoadError> {
    let t = s.trim();
    match t {
        "1" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(LoadError::ParseBool { column: col.to_string(), value: t.to_string() }),
    }
}

fn parse_datetime(s: &str, col: &str) -> Result<chrono::DateTime<chrono::Utc>, LoadError> {
    let t = s.trim();
    t.parse::<chrono::DateTime<chrono::Utc>>()
        .map_err(|_| LoadError::ParseDateTime { column: col.to_string(), value: t.to_string() })
}

fn split_csv_line(line: &str) -> Vec<String> {
    line.split(',').map(|s| s.trim().to_string()).collect()
}
