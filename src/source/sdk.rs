//! In-process SDK source: a long-lived Open API WebSocket session.
//!
//! The session is opened lazily on first use (application auth, account
//! auth, symbol list) and reused across fetches. Access is serialized
//! behind an async mutex so overlapping fetches for different symbols
//! never interleave frames. Any error other than an unknown symbol
//! discards the session; the next fetch reconnects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
};
use tracing::{debug, info, warn};
use tungstenite::Message;
use zeroize::Zeroizing;

use super::protocol::{
    AccountAuthReq, ApplicationAuthReq, ErrorRes, GetTrendbarsReq, GetTrendbarsRes,
    RequestEnvelope, ResponseEnvelope, SymbolsListReq, SymbolsListRes, Trendbar, payload_type,
};
use super::{CandleSource, RawPayload, SourceKind};
use crate::config::SdkConfig;
use crate::models::CandleRequest;
use crate::{LiveDataError, Result};

/// Write half of an Open API session.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of an Open API session.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Candle source backed by a direct broker session.
pub struct SdkSource {
    config: SdkConfig,
    tls: Arc<rustls::ClientConfig>,
    session: Mutex<Option<SdkSession>>,
}

impl SdkSource {
    #[must_use]
    pub fn new(config: SdkConfig, tls: rustls::ClientConfig) -> Self {
        Self {
            config,
            tls: Arc::new(tls),
            session: Mutex::new(None),
        }
    }

    /// Returns `true` while an authenticated session is held.
    pub async fn is_connected(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Connects and authenticates a fresh session.
    async fn open_session(&self, token: &str) -> Result<SdkSession> {
        info!(url = %self.config.url, account_id = self.config.account_id, "Opening SDK session");

        let connector = Connector::Rustls(self.tls.clone());
        let connect = connect_async_tls_with_config(
            self.config.url.as_str(),
            None,
            false,
            Some(connector),
        );
        let (ws_stream, _) = tokio::time::timeout(self.config.timeout, connect)
            .await
            .map_err(|_| LiveDataError::transport("timed out connecting to the SDK endpoint"))??;
        let (write, read) = ws_stream.split();

        let mut session = SdkSession {
            write,
            read,
            token: Zeroizing::new(token.to_string()),
            symbols: HashMap::new(),
            next_id: 0,
            timeout: self.config.timeout,
        };

        if let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        {
            session
                .request::<_, serde_json::Value>(
                    payload_type::APPLICATION_AUTH_REQ,
                    payload_type::APPLICATION_AUTH_RES,
                    &ApplicationAuthReq {
                        client_id,
                        client_secret,
                    },
                )
                .await?;
            debug!("Application authorized");
        }

        session
            .request::<_, serde_json::Value>(
                payload_type::ACCOUNT_AUTH_REQ,
                payload_type::ACCOUNT_AUTH_RES,
                &AccountAuthReq {
                    ctid_trader_account_id: self.config.account_id,
                    access_token: token,
                },
            )
            .await?;

        let list: SymbolsListRes = session
            .request(
                payload_type::SYMBOLS_LIST_REQ,
                payload_type::SYMBOLS_LIST_RES,
                &SymbolsListReq {
                    ctid_trader_account_id: self.config.account_id,
                },
            )
            .await?;
        session.symbols = list
            .symbol
            .into_iter()
            .filter_map(|s| Some((s.symbol_name?.to_ascii_uppercase(), s.symbol_id)))
            .collect();

        info!(symbols = session.symbols.len(), "SDK session ready");
        Ok(session)
    }
}

#[async_trait]
impl CandleSource for SdkSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Sdk
    }

    async fn fetch_candles(
        &self,
        request: &CandleRequest,
        token: Option<&str>,
    ) -> Result<RawPayload> {
        let token = token.ok_or_else(|| LiveDataError::auth("SDK session needs an access token"))?;

        let mut guard = self.session.lock().await;
        let mut session = match guard.take() {
            Some(session) if session.token.as_str() == token => session,
            Some(_) => {
                debug!("Access token changed; reopening SDK session");
                self.open_session(token).await?
            }
            None => self.open_session(token).await?,
        };

        match session.trendbars(self.config.account_id, request).await {
            Ok(payload) => {
                *guard = Some(session);
                Ok(payload)
            }
            // The session itself is fine when the symbol is unknown.
            Err(e @ LiveDataError::Config(_)) => {
                *guard = Some(session);
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Discarding SDK session");
                Err(e)
            }
        }
    }
}

/// An authenticated Open API connection.
struct SdkSession {
    write: WsWriter,
    read: WsReader,
    token: Zeroizing<String>,
    /// Upper-cased symbol name to broker symbol id.
    symbols: HashMap<String, i64>,
    next_id: u64,
    timeout: Duration,
}

impl SdkSession {
    /// Requests trendbars and returns them as a `{"trendbars": [...]}`
    /// payload of absolute-price records.
    async fn trendbars(&mut self, account_id: i64, request: &CandleRequest) -> Result<RawPayload> {
        let symbol_id = *self
            .symbols
            .get(&request.symbol.to_ascii_uppercase())
            .ok_or_else(|| {
                LiveDataError::Config(format!("symbol {} is not offered by the broker", request.symbol))
            })?;

        let to = Utc::now().timestamp_millis();
        let span_ms = request.timeframe.minutes() * 60_000 * i64::from(request.count);

        let response: GetTrendbarsRes = self
            .request(
                payload_type::GET_TRENDBARS_REQ,
                payload_type::GET_TRENDBARS_RES,
                &GetTrendbarsReq {
                    ctid_trader_account_id: account_id,
                    from_timestamp: to - span_ms,
                    to_timestamp: to,
                    period: request.timeframe.as_str(),
                    symbol_id,
                    count: request.count,
                },
            )
            .await?;

        debug!(
            symbol = %request.symbol,
            timeframe = %request.timeframe,
            bars = response.trendbar.len(),
            "Received trendbars"
        );

        let records = response
            .trendbar
            .iter()
            .map(Trendbar::to_record)
            .collect::<Result<Vec<_>>>()?;
        Ok(serde_json::json!({ "trendbars": records }))
    }

    /// Sends one request and waits for its correlated response.
    async fn request<T, R>(&mut self, request_type: u32, response_type: u32, payload: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        self.next_id += 1;
        let id = format!("cd-{}", self.next_id);
        let envelope = RequestEnvelope {
            client_msg_id: &id,
            payload_type: request_type,
            payload,
        };
        let json = serde_json::to_string(&envelope)
            .map_err(|e| LiveDataError::transport(format!("failed to encode request: {e}")))?;
        tokio::time::timeout(self.timeout, self.write.send(Message::Text(json.into())))
            .await
            .map_err(|_| LiveDataError::transport(format!("timed out sending request {request_type}")))??;

        let response = tokio::time::timeout(self.timeout, self.await_response(&id))
            .await
            .map_err(|_| {
                LiveDataError::transport(format!("timed out waiting for response to {request_type}"))
            })??;

        match response.payload_type {
            payload_type::ERROR_RES | payload_type::OA_ERROR_RES => {
                Err(vendor_error(response.payload))
            }
            t if t == response_type => serde_json::from_value(response.payload).map_err(|e| {
                LiveDataError::transport(format!("malformed payload for {response_type}: {e}"))
            }),
            other => Err(LiveDataError::transport(format!(
                "expected payload type {response_type}, got {other}"
            ))),
        }
    }

    /// Reads frames until the one answering `id` arrives.
    async fn await_response(&mut self, id: &str) -> Result<ResponseEnvelope> {
        while let Some(frame) = self.read.next().await {
            match frame? {
                Message::Text(text) => {
                    let envelope: ResponseEnvelope = serde_json::from_str(text.as_str())
                        .map_err(|e| LiveDataError::transport(format!("malformed frame: {e}")))?;
                    if envelope.client_msg_id.as_deref() == Some(id) {
                        return Ok(envelope);
                    }
                    if envelope.payload_type != payload_type::HEARTBEAT_EVENT {
                        debug!(payload_type = envelope.payload_type, "Ignoring unsolicited frame");
                    }
                }
                Message::Close(frame) => {
                    return Err(LiveDataError::transport(format!(
                        "SDK endpoint closed the session: {frame:?}"
                    )));
                }
                _ => {}
            }
        }

        Err(LiveDataError::transport("SDK session ended"))
    }
}

/// Maps an error frame to [`LiveDataError::Auth`] or
/// [`LiveDataError::Transport`].
fn vendor_error(payload: serde_json::Value) -> LiveDataError {
    let raw = payload.to_string();
    match serde_json::from_value::<ErrorRes>(payload) {
        Ok(err) => {
            let message = format!(
                "vendor error {}: {}",
                err.error_code,
                err.description.as_deref().unwrap_or("no description")
            );
            if err.is_auth_failure() {
                LiveDataError::auth(message)
            } else {
                LiveDataError::Transport {
                    status: None,
                    message,
                    body: Some(raw),
                }
            }
        }
        Err(_) => LiveDataError::Transport {
            status: None,
            message: "unrecognized vendor error".to_string(),
            body: Some(raw),
        },
    }
}
