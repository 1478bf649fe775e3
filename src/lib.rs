//! Live market-data ingestion for a trading dashboard.
//!
//! Fetches OHLC candles from a broker (through an HTTP bridge or an
//! in-process Open API session), normalizes whatever shape the upstream
//! returns, caches it briefly, and forwards high-confidence trade alerts
//! to Telegram.

pub mod auth;
pub mod bridge;
pub mod config;
pub mod credentials;
pub mod error;
pub mod feed;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod source;
pub mod tls;

pub use error::{ErrorKind, LiveDataError, Result};
