//! JSON wire messages of the broker's Open API WebSocket session.
//!
//! Every frame is an envelope `{clientMsgId, payloadType, payload}`.
//! Responses echo the `clientMsgId` of the request they answer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{LiveDataError, Result};

/// Numeric payload types used by the session.
pub mod payload_type {
    pub const ERROR_RES: u32 = 50;
    pub const HEARTBEAT_EVENT: u32 = 51;
    pub const APPLICATION_AUTH_REQ: u32 = 2100;
    pub const APPLICATION_AUTH_RES: u32 = 2101;
    pub const ACCOUNT_AUTH_REQ: u32 = 2102;
    pub const ACCOUNT_AUTH_RES: u32 = 2103;
    pub const SYMBOLS_LIST_REQ: u32 = 2114;
    pub const SYMBOLS_LIST_RES: u32 = 2115;
    pub const GET_TRENDBARS_REQ: u32 = 2137;
    pub const GET_TRENDBARS_RES: u32 = 2138;
    pub const OA_ERROR_RES: u32 = 2142;
}

/// Vendor error codes that mean the credential was rejected.
const AUTH_ERROR_CODES: &[&str] = &[
    "CH_CLIENT_AUTH_FAILURE",
    "CH_CLIENT_NOT_AUTHENTICATED",
    "CH_ACCESS_TOKEN_INVALID",
    "OA_AUTH_TOKEN_EXPIRED",
    "ACCESS_DENIED",
];

/// Trendbar prices are integers in units of 1e-5.
const PRICE_SCALE: u32 = 5;

/// Outgoing frame.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope<'a, T> {
    pub client_msg_id: &'a str,
    pub payload_type: u32,
    pub payload: &'a T,
}

/// Incoming frame; the payload is decoded once its type is known.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub client_msg_id: Option<String>,
    pub payload_type: u32,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationAuthReq<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountAuthReq<'a> {
    pub ctid_trader_account_id: i64,
    pub access_token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolsListReq {
    pub ctid_trader_account_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SymbolsListRes {
    #[serde(default)]
    pub symbol: Vec<LightSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightSymbol {
    pub symbol_id: i64,
    #[serde(default)]
    pub symbol_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTrendbarsReq<'a> {
    pub ctid_trader_account_id: i64,
    /// Milliseconds since the epoch.
    pub from_timestamp: i64,
    pub to_timestamp: i64,
    pub period: &'a str,
    pub symbol_id: i64,
    pub count: u32,
}

#[derive(Debug, Deserialize)]
pub struct GetTrendbarsRes {
    #[serde(default)]
    pub trendbar: Vec<Trendbar>,
}

/// One bar in relative-price form: `low` is absolute, the other prices
/// are offsets above it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trendbar {
    #[serde(default)]
    pub volume: i64,
    #[serde(default)]
    pub low: i64,
    #[serde(default)]
    pub delta_open: i64,
    #[serde(default)]
    pub delta_close: i64,
    #[serde(default)]
    pub delta_high: i64,
    pub utc_timestamp_in_minutes: i64,
}

impl Trendbar {
    /// Converts to an absolute-price record (`time` in epoch seconds,
    /// prices as exact decimal strings).
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Transport`] when an offset or the
    /// timestamp overflows.
    pub fn to_record(&self) -> Result<serde_json::Value> {
        let malformed = || {
            LiveDataError::transport(format!(
                "malformed trendbar at minute {}",
                self.utc_timestamp_in_minutes
            ))
        };
        let price = |delta: i64| {
            self.low
                .checked_add(delta)
                .map(|raw| Decimal::new(raw, PRICE_SCALE).normalize().to_string())
                .ok_or_else(malformed)
        };
        Ok(json!({
            "time": self.utc_timestamp_in_minutes.checked_mul(60).ok_or_else(malformed)?,
            "open": price(self.delta_open)?,
            "high": price(self.delta_high)?,
            "low": price(0)?,
            "close": price(self.delta_close)?,
            "volume": self.volume,
        }))
    }
}

/// Error frame (`ERROR_RES` or `OA_ERROR_RES`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRes {
    pub error_code: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ErrorRes {
    /// Whether the vendor rejected the credential rather than the request.
    pub fn is_auth_failure(&self) -> bool {
        AUTH_ERROR_CODES.contains(&self.error_code.as_str())
    }
}
