//! Upstream payload normalization.
//!
//! Upstream candle payloads come in three shapes. [`detect`] classifies a
//! payload once into a [`PayloadKind`]; [`normalize`] then parses every
//! row into a [`Candle`], applies the OHLC bound checks and returns the
//! rows in strictly increasing timestamp order.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use crate::models::Candle;
use crate::{LiveDataError, Result};

/// Keys under which a wrapping object may carry the candle list.
const NESTED_KEYS: &[&str] = &["candles", "data", "bars", "trendbars", "result", "values"];

const TIME_ALIASES: &[&str] = &["time", "timestamp", "datetime", "date", "t"];
const OPEN_ALIASES: &[&str] = &["open", "Open", "o"];
const HIGH_ALIASES: &[&str] = &["high", "High", "h"];
const LOW_ALIASES: &[&str] = &["low", "Low", "l"];
const CLOSE_ALIASES: &[&str] = &["close", "Close", "c"];
const VOLUME_ALIASES: &[&str] = &["volume", "Volume", "vol", "v"];

/// Epoch values at or above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Layout of the individual rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// Objects with named fields.
    Objects,
    /// Arrays in `[time, open, high, low, close, volume?]` column order.
    Arrays,
}

/// Payload shape, detected once per payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// `[{"time": .., "open": .., ..}, ..]`
    Records,
    /// `[[time, open, high, low, close, volume], ..]`
    Rows,
    /// `{"candles": [..]}` wrapping either layout.
    Nested { key: &'static str, layout: RowLayout },
}

impl PayloadKind {
    pub fn layout(&self) -> RowLayout {
        match self {
            PayloadKind::Records => RowLayout::Objects,
            PayloadKind::Rows => RowLayout::Arrays,
            PayloadKind::Nested { layout, .. } => *layout,
        }
    }
}

/// Result of a successful normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub candles: Vec<Candle>,
    /// Rows removed by bound checks or as duplicate timestamps.
    pub dropped: usize,
    pub kind: PayloadKind,
}

/// Classifies `raw` and returns its row list.
///
/// # Errors
///
/// Returns [`LiveDataError::Schema`] if the payload matches none of the
/// known shapes.
pub fn detect(raw: &Value) -> Result<(PayloadKind, &[Value])> {
    match raw {
        Value::Array(rows) => {
            let kind = match row_layout(rows)? {
                RowLayout::Objects => PayloadKind::Records,
                RowLayout::Arrays => PayloadKind::Rows,
            };
            Ok((kind, rows.as_slice()))
        }
        Value::Object(map) => {
            for &key in NESTED_KEYS {
                if let Some(Value::Array(rows)) = map.get(key) {
                    let layout = row_layout(rows)?;
                    return Ok((PayloadKind::Nested { key, layout }, rows.as_slice()));
                }
            }
            Err(LiveDataError::Schema(format!(
                "unrecognized payload shape: object without a list under any of {NESTED_KEYS:?}"
            )))
        }
        other => Err(LiveDataError::Schema(format!(
            "unrecognized payload shape: {}",
            type_name(other)
        ))),
    }
}

/// Normalizes an upstream payload into validated candles.
///
/// # Errors
///
/// Returns [`LiveDataError::Schema`] naming the first structurally invalid
/// row and field, or `"no valid candles"` when nothing survives validation.
pub fn normalize(raw: &Value) -> Result<Normalized> {
    let (kind, rows) = detect(raw)?;

    let mut parsed = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let candle = match kind.layout() {
            RowLayout::Objects => parse_object(idx, row)?,
            RowLayout::Arrays => parse_array(idx, row)?,
        };
        parsed.push(candle);
    }

    let total = parsed.len();
    parsed.retain(Candle::is_consistent);
    let mut dropped = total - parsed.len();

    parsed.sort_by_key(|c| c.timestamp);
    let mut candles: Vec<Candle> = Vec::with_capacity(parsed.len());
    for candle in parsed {
        match candles.last_mut() {
            // Later rows for the same bar supersede earlier ones.
            Some(last) if last.timestamp == candle.timestamp => {
                *last = candle;
                dropped += 1;
            }
            _ => candles.push(candle),
        }
    }

    if candles.is_empty() {
        return Err(LiveDataError::Schema("no valid candles".to_string()));
    }

    if dropped > 0 {
        debug!(dropped, kept = candles.len(), "Dropped invalid candle rows");
    }

    Ok(Normalized {
        candles,
        dropped,
        kind,
    })
}

/// Decides the row layout from the first row. Empty lists count as records.
fn row_layout(rows: &[Value]) -> Result<RowLayout> {
    match rows.first() {
        None | Some(Value::Object(_)) => Ok(RowLayout::Objects),
        Some(Value::Array(_)) => Ok(RowLayout::Arrays),
        Some(other) => Err(LiveDataError::Schema(format!(
            "unrecognized payload shape: list of {}",
            type_name(other)
        ))),
    }
}

fn parse_object(idx: usize, row: &Value) -> Result<Candle> {
    let Value::Object(map) = row else {
        return Err(LiveDataError::Schema(format!(
            "row {idx}: expected an object, got {}",
            type_name(row)
        )));
    };

    let field = |aliases: &[&str]| aliases.iter().find_map(|a| map.get(*a));
    let required = |name: &str, aliases: &[&str]| {
        field(aliases)
            .ok_or_else(|| LiveDataError::Schema(format!("row {idx}: missing field `{name}`")))
    };

    Ok(Candle {
        timestamp: parse_time(idx, required("time", TIME_ALIASES)?)?,
        open: parse_price(idx, "open", required("open", OPEN_ALIASES)?)?,
        high: parse_price(idx, "high", required("high", HIGH_ALIASES)?)?,
        low: parse_price(idx, "low", required("low", LOW_ALIASES)?)?,
        close: parse_price(idx, "close", required("close", CLOSE_ALIASES)?)?,
        volume: parse_volume(idx, field(VOLUME_ALIASES))?,
    })
}

fn parse_array(idx: usize, row: &Value) -> Result<Candle> {
    let Value::Array(cols) = row else {
        return Err(LiveDataError::Schema(format!(
            "row {idx}: expected an array, got {}",
            type_name(row)
        )));
    };
    if cols.len() < 5 {
        return Err(LiveDataError::Schema(format!(
            "row {idx}: expected at least 5 columns, got {}",
            cols.len()
        )));
    }

    Ok(Candle {
        timestamp: parse_time(idx, &cols[0])?,
        open: parse_price(idx, "open", &cols[1])?,
        high: parse_price(idx, "high", &cols[2])?,
        low: parse_price(idx, "low", &cols[3])?,
        close: parse_price(idx, "close", &cols[4])?,
        volume: parse_volume(idx, cols.get(5))?,
    })
}

fn parse_price(idx: usize, name: &str, value: &Value) -> Result<Decimal> {
    to_decimal(value).ok_or_else(|| {
        LiveDataError::Schema(format!("row {idx}: field `{name}` is not numeric: {value}"))
    })
}

fn parse_volume(idx: usize, value: Option<&Value>) -> Result<Option<Decimal>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_price(idx, "volume", v).map(Some),
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(Decimal::from(i));
            }
            n.to_string()
        }
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn parse_time(idx: usize, value: &Value) -> Result<DateTime<Utc>> {
    let parsed = match value {
        Value::Number(n) => match n.as_i64() {
            Some(epoch) => from_epoch(epoch),
            None => n.as_f64().and_then(|f| from_epoch(f.trunc() as i64)),
        },
        Value::String(s) => parse_time_str(s.trim()),
        _ => None,
    };

    parsed.ok_or_else(|| {
        LiveDataError::Schema(format!("row {idx}: field `time` is not a timestamp: {value}"))
    })
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(epoch) = s.parse::<i64>() {
        return from_epoch(epoch);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Interprets an epoch in seconds, or milliseconds when large enough.
fn from_epoch(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
