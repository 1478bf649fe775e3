//! HTTP bridge source.
//!
//! Calls `GET {LIVE_DATA_URL}?symbol=..&timeframe=..&count=..` on a
//! bridge process that fronts the broker SDK. The bearer token and the
//! API-key header are both attached when available.

use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::debug;

use super::{CandleSource, RawPayload, SourceKind};
use crate::config::{AuthConfig, BridgeSourceConfig};
use crate::models::CandleRequest;
use crate::{LiveDataError, Result};

/// Candle source backed by an HTTP bridge.
pub struct HttpBridgeSource {
    url: String,
    api_key: Option<(HeaderName, HeaderValue)>,
    http: reqwest::Client,
}

impl HttpBridgeSource {
    /// Creates a bridge source with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Config`] if the API-key header name or
    /// value is not a valid HTTP header, or the client cannot be built.
    pub fn new(
        config: BridgeSourceConfig,
        auth: &AuthConfig,
        tls: rustls::ClientConfig,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(config.timeout)
            .build()
            .map_err(|e| LiveDataError::Config(format!("failed to build HTTP client: {e}")))?;

        Self::with_client(config, auth, http)
    }

    /// Creates a bridge source using an existing client.
    ///
    /// # Errors
    ///
    /// Same as [`HttpBridgeSource::new`].
    pub fn with_client(
        config: BridgeSourceConfig,
        auth: &AuthConfig,
        http: reqwest::Client,
    ) -> Result<Self> {
        let api_key = match &auth.api_key {
            Some(key) => {
                let name = HeaderName::from_bytes(auth.api_key_header.as_bytes()).map_err(|e| {
                    LiveDataError::Config(format!(
                        "API_KEY_HEADER {:?} is not a valid header name: {e}",
                        auth.api_key_header
                    ))
                })?;
                let mut value = HeaderValue::from_str(key.as_str()).map_err(|_| {
                    LiveDataError::Config("API_KEY is not a valid header value".to_string())
                })?;
                value.set_sensitive(true);
                Some((name, value))
            }
            None => None,
        };

        Ok(Self {
            url: config.url,
            api_key,
            http,
        })
    }
}

#[async_trait]
impl CandleSource for HttpBridgeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::HttpBridge
    }

    async fn fetch_candles(
        &self,
        request: &CandleRequest,
        token: Option<&str>,
    ) -> Result<RawPayload> {
        let count = request.count.to_string();
        let mut builder = self.http.get(&self.url).query(&[
            ("symbol", request.symbol.as_str()),
            ("timeframe", request.timeframe.as_str()),
            ("count", count.as_str()),
        ]);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some((name, value)) = &self.api_key {
            builder = builder.header(name.clone(), value.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(LiveDataError::Transport {
                status: Some(status.as_u16()),
                message: format!("bridge returned {status}"),
                body: Some(body),
            });
        }

        debug!(
            symbol = %request.symbol,
            timeframe = %request.timeframe,
            bytes = body.len(),
            "Bridge responded"
        );

        serde_json::from_str(&body)
            .map_err(|e| LiveDataError::Schema(format!("bridge response is not JSON: {e}")))
    }
}
