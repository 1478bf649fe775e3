//! Live data Facade: the single entry point the dashboard calls.
//!
//! [`LiveDataFeed`] runs token → source → normalizer for each request and
//! tracks a per-`(symbol, timeframe)` state (`Idle → Fetching → Ready |
//! Failed`). Ready series are served from memory while they are younger
//! than the freshness window. Auth and transport failures get exactly one
//! immediate retry; everything else is surfaced as is.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{self, TokenProvider};
use crate::config::{AppConfig, FeedConfig, SourceConfig};
use crate::error::ErrorKind;
use crate::models::{CandleRequest, CandleSeries, Timeframe, broker_symbol};
use crate::normalize::normalize;
use crate::source::{CandleSource, build_source};
use crate::{LiveDataError, Result};

/// Cache key: dashboard symbol and timeframe.
type FeedKey = (String, Timeframe);

/// Last error recorded for a key.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&LiveDataError> for FeedFailure {
    fn from(e: &LiveDataError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Internal per-key state.
#[derive(Debug, Clone)]
enum FeedState {
    Fetching,
    Ready {
        series: Arc<CandleSeries>,
        fetched_at: Instant,
    },
    Failed(FeedFailure),
}

/// What the dashboard should render for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    /// Never requested: "no data yet".
    Idle,
    Fetching,
    Ready(Arc<CandleSeries>),
    /// Last fetch failed: "data unavailable".
    Failed(FeedFailure),
}

impl fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedStatus::Idle => write!(f, "no data yet"),
            FeedStatus::Fetching => write!(f, "loading"),
            FeedStatus::Ready(series) => match series.last() {
                Some(last) => write!(
                    f,
                    "{} candles via {}, last close {} at {}",
                    series.len(),
                    series.provider,
                    last.close,
                    last.timestamp.format("%Y-%m-%d %H:%M UTC")
                ),
                None => write!(f, "no candles"),
            },
            FeedStatus::Failed(failure) => {
                write!(f, "data unavailable ({}): {}", failure.kind, failure.message)
            }
        }
    }
}

/// Facade over credential, source and normalizer.
pub struct LiveDataFeed {
    tokens: Arc<TokenProvider>,
    source: Arc<dyn CandleSource>,
    config: FeedConfig,
    entries: Mutex<HashMap<FeedKey, FeedState>>,
}

impl LiveDataFeed {
    #[must_use]
    pub fn new(
        tokens: Arc<TokenProvider>,
        source: Arc<dyn CandleSource>,
        config: FeedConfig,
    ) -> Self {
        Self {
            tokens,
            source,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Wires the Facade from application configuration: resolves the auth
    /// mode, builds the token provider and the configured source.
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Config`] if the configuration is
    /// ambiguous or incomplete, or TLS setup fails.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mode = auth::resolve(&config.auth, &config.source)?;
        let tls = crate::tls::build_tls_config(&config.tls)?;
        let timeout = match &config.source {
            SourceConfig::HttpBridge(bridge) => bridge.timeout,
            SourceConfig::Sdk(sdk) => sdk.timeout,
        };
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls.clone())
            .timeout(timeout)
            .build()
            .map_err(|e| LiveDataError::Config(format!("failed to build HTTP client: {e}")))?;

        let tokens = Arc::new(TokenProvider::new(mode, &config.auth, http)?);
        let source = build_source(&config.source, &config.auth, &tls)?;

        info!(auth_mode = %mode, source = %source.kind(), "Live data feed configured");
        Ok(Self::new(tokens, source, config.feed.clone()))
    }

    /// Returns candles for `symbol` at `timeframe`.
    ///
    /// A Ready series younger than the freshness window is returned
    /// without any network call. Otherwise the pipeline runs, retrying
    /// once on an auth or transport failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt; the key is then marked
    /// Failed.
    pub async fn get_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: u32,
    ) -> Result<Arc<CandleSeries>> {
        let key = (symbol.to_string(), timeframe);

        {
            let mut entries = self.entries.lock().await;
            if let Some(FeedState::Ready { series, fetched_at }) = entries.get(&key)
                && fetched_at.elapsed() < self.config.freshness
            {
                debug!(symbol, %timeframe, "Serving cached candles");
                return Ok(series.clone());
            }
            entries.insert(key.clone(), FeedState::Fetching);
        }

        let request = CandleRequest::new(broker_symbol(symbol), timeframe, count);
        let result = match self.fetch_once(symbol, &request).await {
            Err(e) if e.kind().is_retryable() => {
                warn!(symbol, %timeframe, error = %e, "Fetch failed; retrying once");
                if e.is_credential_rejection() {
                    self.tokens.invalidate().await;
                }
                self.fetch_once(symbol, &request).await
            }
            other => other,
        };

        let mut entries = self.entries.lock().await;
        match result {
            Ok(series) => {
                info!(
                    symbol,
                    %timeframe,
                    candles = series.len(),
                    dropped = series.dropped,
                    "Candles ready"
                );
                entries.insert(
                    key,
                    FeedState::Ready {
                        series: series.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(series)
            }
            Err(e) => {
                warn!(symbol, %timeframe, kind = %e.kind(), error = %e, "Candles unavailable");
                entries.insert(key, FeedState::Failed(FeedFailure::from(&e)));
                Err(e)
            }
        }
    }

    /// Dashboard-level fetch: maps an interval (`"15m"`) and a period
    /// (`"5d"`) to a timeframe and bar count.
    ///
    /// # Errors
    ///
    /// Same as [`LiveDataFeed::get_candles`].
    pub async fn get_ohlc(
        &self,
        symbol: &str,
        interval: &str,
        period: &str,
    ) -> Result<Arc<CandleSeries>> {
        let timeframe = Timeframe::from_interval(interval);
        let count = timeframe.bars_for_period(period);
        self.get_candles(symbol, timeframe, count).await
    }

    /// Current state of a key.
    pub async fn status(&self, symbol: &str, timeframe: Timeframe) -> FeedStatus {
        let entries = self.entries.lock().await;
        match entries.get(&(symbol.to_string(), timeframe)) {
            None => FeedStatus::Idle,
            Some(FeedState::Fetching) => FeedStatus::Fetching,
            Some(FeedState::Ready { series, .. }) => FeedStatus::Ready(series.clone()),
            Some(FeedState::Failed(failure)) => FeedStatus::Failed(failure.clone()),
        }
    }

    /// One pass of token → source → normalizer → staleness guard.
    async fn fetch_once(&self, symbol: &str, request: &CandleRequest) -> Result<Arc<CandleSeries>> {
        let token = self.tokens.get_token().await?;
        let payload = self
            .source
            .fetch_candles(request, token.as_deref())
            .await?;
        let normalized = normalize(&payload)?;

        if self.config.stale_guard
            && let Some(last) = normalized.candles.last()
        {
            let lag_minutes = (Utc::now() - last.timestamp).num_seconds() as f64 / 60.0;
            let limit_minutes = request.timeframe.max_lag_minutes();
            if lag_minutes > limit_minutes as f64 {
                return Err(LiveDataError::Stale {
                    lag_minutes,
                    limit_minutes,
                });
            }
        }

        Ok(Arc::new(CandleSeries {
            symbol: symbol.to_string(),
            used_symbol: request.symbol.clone(),
            timeframe: request.timeframe,
            provider: self.source.kind(),
            candles: normalized.candles,
            dropped: normalized.dropped,
        }))
    }
}
