//! Candle sources.
//!
//! A [`CandleSource`] turns a [`CandleRequest`] into an upstream JSON
//! payload. Two variants exist, selected once from configuration:
//! - [`http::HttpBridgeSource`] - calls a bridge process over HTTP
//! - [`sdk::SdkSource`] - drives the broker's Open API session directly
//!
//! Sources never cache candles; that is the Facade's job.

pub mod http;
pub mod protocol;
pub mod sdk;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::config::{AuthConfig, SourceConfig};
use crate::models::CandleRequest;

pub use http::HttpBridgeSource;
pub use sdk::SdkSource;

/// Upstream payload before normalization.
pub type RawPayload = serde_json::Value;

/// Which variant produced a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    HttpBridge,
    Sdk,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::HttpBridge => "http_bridge",
            SourceKind::Sdk => "sdk",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability shared by both candle source variants.
#[async_trait]
pub trait CandleSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetches the raw payload for `request`, authenticating with `token`
    /// when one is supplied.
    ///
    /// # Errors
    ///
    /// [`LiveDataError::Transport`](crate::LiveDataError::Transport) on
    /// network failure, timeout or an upstream error response;
    /// [`LiveDataError::Auth`](crate::LiveDataError::Auth) when the
    /// upstream rejects the credential.
    async fn fetch_candles(&self, request: &CandleRequest, token: Option<&str>)
    -> Result<RawPayload>;
}

/// Builds the source variant named by `config`.
///
/// # Errors
///
/// Returns [`LiveDataError::Config`](crate::LiveDataError::Config) if the
/// HTTP client or TLS connector cannot be built.
pub fn build_source(
    config: &SourceConfig,
    auth: &AuthConfig,
    tls: &rustls::ClientConfig,
) -> Result<Arc<dyn CandleSource>> {
    match config {
        SourceConfig::HttpBridge(bridge) => Ok(Arc::new(HttpBridgeSource::new(
            bridge.clone(),
            auth,
            tls.clone(),
        )?)),
        SourceConfig::Sdk(sdk) => Ok(Arc::new(SdkSource::new(sdk.clone(), tls.clone()))),
    }
}
