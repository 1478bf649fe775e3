//! HTTP bridge server fronting the in-process SDK source.
//!
//! Serves the wire shape [`crate::source::HttpBridgeSource`] consumes:
//!
//! - `GET /health` → `{ok, connected, has_client_id, has_client_secret, has_account_id}`
//! - `GET /candles?symbol=XAUUSD&timeframe=M15&count=300` → `{"candles": [...]}`
//!
//! Source failures are answered with `503 {"detail": "bridge_error: ..."}`.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{self, TokenProvider};
use crate::config::{AppConfig, SourceConfig};
use crate::models::{Candle, CandleRequest, Timeframe, broker_symbol};
use crate::normalize::normalize;
use crate::source::{CandleSource, SdkSource};
use crate::{LiveDataError, Result};

const MIN_COUNT: u32 = 10;
const MAX_COUNT: u32 = 5000;
const DEFAULT_COUNT: u32 = 300;

/// Shared state of the bridge routes.
pub struct BridgeState {
    pub sdk: Arc<SdkSource>,
    pub tokens: Arc<TokenProvider>,
}

impl BridgeState {
    /// Wires the SDK source and its token provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Config`] if no SDK source is configured,
    /// no credential is available for it, or TLS setup fails.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let SourceConfig::Sdk(sdk) = &config.source else {
            return Err(LiveDataError::Config(
                "the bridge requires ACCOUNT_ID".to_string(),
            ));
        };
        let mode = auth::resolve(&config.auth, &config.source)?;
        let tls = crate::tls::build_tls_config(&config.tls)?;
        let http = crate::tls::build_http_client(&config.tls, sdk.timeout)?;

        Ok(Self {
            sdk: Arc::new(SdkSource::new(sdk.clone(), tls)),
            tokens: Arc::new(TokenProvider::new(mode, &config.auth, http)?),
        })
    }
}

/// Builds the bridge router.
pub fn router(state: Arc<BridgeState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/candles", get(candles))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    connected: bool,
    has_client_id: bool,
    has_client_secret: bool,
    has_account_id: bool,
}

async fn health(State(state): State<Arc<BridgeState>>) -> impl IntoResponse {
    let config = state.sdk.config();
    Json(HealthResponse {
        ok: true,
        connected: state.sdk.is_connected().await,
        has_client_id: config.client_id.is_some(),
        has_client_secret: config.client_secret.is_some(),
        has_account_id: config.account_id != 0,
    })
}

#[derive(Debug, Deserialize)]
struct CandlesQuery {
    symbol: String,
    #[serde(default)]
    timeframe: Option<String>,
    #[serde(default)]
    count: Option<u32>,
}

#[derive(Serialize)]
struct CandlesResponse {
    candles: Vec<Candle>,
}

async fn candles(
    State(state): State<Arc<BridgeState>>,
    Query(query): Query<CandlesQuery>,
) -> Response {
    let timeframe = match query.timeframe.as_deref() {
        None => Timeframe::M15,
        Some(name) => match Timeframe::from_wire(name) {
            Some(tf) => tf,
            None => {
                return bad_request(format!("unknown timeframe {name:?}"));
            }
        },
    };
    let count = query.count.unwrap_or(DEFAULT_COUNT);
    if !(MIN_COUNT..=MAX_COUNT).contains(&count) {
        return bad_request(format!("count must be between {MIN_COUNT} and {MAX_COUNT}"));
    }

    let request = CandleRequest::new(broker_symbol(&query.symbol), timeframe, count);
    match fetch(&state, &request).await {
        Ok(candles) => {
            info!(symbol = %request.symbol, %timeframe, candles = candles.len(), "Served candles");
            Json(CandlesResponse { candles }).into_response()
        }
        Err(e) => {
            warn!(symbol = %request.symbol, %timeframe, error = %e, "Bridge request failed");
            if e.is_credential_rejection() {
                state.tokens.invalidate().await;
            }
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": format!("bridge_error: {e}") })),
            )
                .into_response()
        }
    }
}

async fn fetch(state: &BridgeState, request: &CandleRequest) -> Result<Vec<Candle>> {
    let token = state
        .tokens
        .get_token()
        .await?
        .ok_or_else(|| LiveDataError::auth("bridge has no access token"))?;
    let payload = state.sdk.fetch_candles(request, Some(&token)).await?;
    Ok(normalize(&payload)?.candles)
}

fn bad_request(detail: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "detail": detail }))).into_response()
}
