//! Canonical OHLCV candle and series types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::Timeframe;
use crate::source::SourceKind;

/// A single OHLC(V) bar.
///
/// Serializes as the bridge wire record: `time` as RFC 3339 and prices as
/// JSON numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candle {
    #[serde(rename = "time", serialize_with = "serialize_time")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::float")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub volume: Option<Decimal>,
}

impl Candle {
    /// Checks `0 <= low <= min(open, close) <= max(open, close) <= high`
    /// and a non-negative volume.
    pub fn is_consistent(&self) -> bool {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);

        self.low >= Decimal::ZERO
            && self.low <= body_low
            && body_high <= self.high
            && self.volume.is_none_or(|v| v >= Decimal::ZERO)
    }
}

fn serialize_time<S: serde::Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

/// Candles for one `(symbol, timeframe)` pair from a single fetch.
///
/// Timestamps are strictly increasing. The series is never mutated after
/// the Facade hands it out.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    /// Symbol as requested by the dashboard.
    pub symbol: String,
    /// Symbol actually sent to the broker.
    pub used_symbol: String,
    pub timeframe: Timeframe,
    pub provider: SourceKind,
    pub candles: Vec<Candle>,
    /// Rows removed by validation (bound checks, duplicates).
    pub dropped: usize,
}

impl CandleSeries {
    /// Most recent candle, if any.
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}
