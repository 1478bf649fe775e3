//! Bridge server tests: routes in isolation and the full
//! bridge-server → bridge-source round trip.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use candle_desk::auth::{AuthMode, TokenProvider};
use candle_desk::bridge::{BridgeState, router};
use candle_desk::config::{AuthConfig, BridgeSourceConfig, FeedConfig};
use candle_desk::feed::LiveDataFeed;
use candle_desk::models::Timeframe;
use candle_desk::source::{HttpBridgeSource, SdkSource, SourceKind};
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;
use zeroize::Zeroizing;

use common::{FakeBroker, GOOD_TOKEN};

fn state(broker: &FakeBroker, token: &str) -> Arc<BridgeState> {
    let auth = AuthConfig {
        access_token: Some(Zeroizing::new(token.to_string())),
        ..AuthConfig::default()
    };
    Arc::new(BridgeState {
        sdk: Arc::new(SdkSource::new(broker.sdk_config(), common::tls_config())),
        tokens: Arc::new(
            TokenProvider::new(AuthMode::StaticToken, &auth, common::http_client())
                .expect("Failed to build provider"),
        ),
    })
}

async fn get(state: Arc<BridgeState>, uri: &str) -> (StatusCode, Value) {
    let response = router(state)
        .oneshot(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("Failed to build request"),
        )
        .await
        .expect("Request failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_reports_configuration() {
    let broker = common::spawn_broker().await;
    let state = state(&broker, GOOD_TOKEN);

    let (status, body) = get(state.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["connected"], false);
    assert_eq!(body["has_client_id"], true);
    assert_eq!(body["has_client_secret"], true);
    assert_eq!(body["has_account_id"], true);

    get(state.clone(), "/candles?symbol=XAUUSD").await;
    let (_, body) = get(state, "/health").await;
    assert_eq!(body["connected"], true);
}

#[tokio::test]
async fn test_candles_wire_shape() {
    let broker = common::spawn_broker().await;

    let (status, body) = get(
        state(&broker, GOOD_TOKEN),
        "/candles?symbol=XAUUSD&timeframe=M15&count=300",
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let candles = body["candles"].as_array().expect("candles array");
    assert_eq!(candles.len(), 3);
    let last = &candles[2];
    assert!(last["time"].as_str().expect("time string").ends_with('Z'));
    assert_eq!(last["open"], 2345.1);
    assert_eq!(last["close"], 2346.25);
    assert_eq!(last["volume"], 1002.0);
}

#[tokio::test]
async fn test_rejects_out_of_range_count_and_unknown_timeframe() {
    let broker = common::spawn_broker().await;
    let state = state(&broker, GOOD_TOKEN);

    for uri in [
        "/candles?symbol=XAUUSD&count=5",
        "/candles?symbol=XAUUSD&count=5001",
        "/candles?symbol=XAUUSD&timeframe=M7",
    ] {
        let (status, _) = get(state.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
    }
    assert_eq!(broker.connections(), 0);
}

#[tokio::test]
async fn test_source_failures_are_503_with_detail() {
    let broker = common::spawn_broker().await;

    let (status, body) = get(state(&broker, "revoked"), "/candles?symbol=XAUUSD").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let detail = body["detail"].as_str().expect("detail string");
    assert!(detail.starts_with("bridge_error: "), "{detail}");

    let (status, _) = get(state(&broker, GOOD_TOKEN), "/candles?symbol=GBPJPY").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_dashboard_reads_candles_through_a_running_bridge() {
    let broker = common::spawn_broker().await;
    let base = common::spawn_http(router(state(&broker, GOOD_TOKEN))).await;

    let source = HttpBridgeSource::with_client(
        BridgeSourceConfig {
            url: format!("{base}/candles"),
            timeout: Duration::from_secs(5),
        },
        &AuthConfig::default(),
        common::http_client(),
    )
    .expect("Failed to build bridge source");
    let tokens = Arc::new(
        TokenProvider::new(AuthMode::None, &AuthConfig::default(), common::http_client())
            .expect("Failed to build provider"),
    );
    let feed = LiveDataFeed::new(tokens, Arc::new(source), FeedConfig::default());

    let series = feed
        .get_candles("XAUUSD", Timeframe::M15, 300)
        .await
        .expect("fetch through bridge failed");

    assert_eq!(series.provider, SourceKind::HttpBridge);
    assert_eq!(series.len(), 3);
    let last = series.last().expect("empty series");
    assert_eq!(last.open, dec!(2345.1));
    assert_eq!(last.high, dec!(2347));
    assert_eq!(last.low, dec!(2344));
    assert_eq!(last.close, dec!(2346.25));
}
