//! Shared data models: candles, timeframes, symbols and alert events.

pub mod alert;
pub mod candle;
pub mod symbol;
pub mod timeframe;

pub use alert::{AlertEvent, Direction, TradePlan};
pub use candle::{Candle, CandleSeries};
pub use symbol::{broker_symbol, canonical_symbol};
pub use timeframe::Timeframe;

/// Parameters of one candle fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandleRequest {
    /// Broker symbol.
    pub symbol: String,
    pub timeframe: Timeframe,
    pub count: u32,
}

impl CandleRequest {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, count: u32) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            count,
        }
    }
}
