//! HTTP bridge source tests against a local bridge stub.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use candle_desk::LiveDataError;
use candle_desk::config::{AuthConfig, BridgeSourceConfig};
use candle_desk::models::{CandleRequest, Timeframe};
use candle_desk::source::{CandleSource, HttpBridgeSource, SourceKind};
use serde_json::json;
use zeroize::Zeroizing;

#[derive(Default)]
struct Seen {
    query: HashMap<String, String>,
    authorization: Option<String>,
    api_key: Option<String>,
}

async fn spawn_bridge(status: StatusCode, body: &'static str) -> (String, Arc<Mutex<Seen>>) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let app = Router::new()
        .route(
            "/candles",
            get(
                move |State(seen): State<Arc<Mutex<Seen>>>,
                      headers: HeaderMap,
                      Query(query): Query<HashMap<String, String>>| async move {
                    let header = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(String::from)
                    };
                    let mut seen = seen.lock().expect("poisoned");
                    seen.query = query;
                    seen.authorization = header("authorization");
                    seen.api_key = header("x-desk-key");
                    (status, body).into_response()
                },
            ),
        )
        .with_state(seen.clone());
    let base = common::spawn_http(app).await;
    (format!("{base}/candles"), seen)
}

fn source(url: String, auth: &AuthConfig) -> HttpBridgeSource {
    HttpBridgeSource::with_client(
        BridgeSourceConfig {
            url,
            timeout: Duration::from_secs(5),
        },
        auth,
        common::http_client(),
    )
    .expect("Failed to build bridge source")
}

#[tokio::test]
async fn test_sends_query_and_both_credentials() {
    let (url, seen) = spawn_bridge(StatusCode::OK, r#"{"candles": []}"#).await;
    let auth = AuthConfig {
        api_key: Some(Zeroizing::new("k-123".to_string())),
        api_key_header: "X-Desk-Key".to_string(),
        ..AuthConfig::default()
    };
    let source = source(url, &auth);
    assert_eq!(source.kind(), SourceKind::HttpBridge);

    let payload = source
        .fetch_candles(&CandleRequest::new("XAUUSD", Timeframe::H1, 240), Some("bearer-1"))
        .await
        .expect("fetch failed");
    assert_eq!(payload, json!({ "candles": [] }));

    let seen = seen.lock().expect("poisoned");
    assert_eq!(seen.query.get("symbol").map(String::as_str), Some("XAUUSD"));
    assert_eq!(seen.query.get("timeframe").map(String::as_str), Some("H1"));
    assert_eq!(seen.query.get("count").map(String::as_str), Some("240"));
    assert_eq!(seen.authorization.as_deref(), Some("Bearer bearer-1"));
    assert_eq!(seen.api_key.as_deref(), Some("k-123"));
}

#[tokio::test]
async fn test_no_credentials_sends_no_headers() {
    let (url, seen) = spawn_bridge(StatusCode::OK, "[]").await;
    let source = source(url, &AuthConfig::default());

    source
        .fetch_candles(&CandleRequest::new("EURUSD", Timeframe::M15, 300), None)
        .await
        .expect("fetch failed");

    let seen = seen.lock().expect("poisoned");
    assert!(seen.authorization.is_none());
    assert!(seen.api_key.is_none());
}

#[tokio::test]
async fn test_server_error_is_transport_with_body() {
    let (url, _) = spawn_bridge(
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"detail":"bridge_error: upstream down"}"#,
    )
    .await;
    let source = source(url, &AuthConfig::default());

    let err = source
        .fetch_candles(&CandleRequest::new("XAUUSD", Timeframe::M15, 300), None)
        .await
        .unwrap_err();
    match err {
        LiveDataError::Transport { status, body, .. } => {
            assert_eq!(status, Some(500));
            assert!(body.unwrap_or_default().contains("upstream down"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_a_credential_rejection() {
    let (url, _) = spawn_bridge(StatusCode::UNAUTHORIZED, "").await;
    let source = source(url, &AuthConfig::default());

    let err = source
        .fetch_candles(&CandleRequest::new("XAUUSD", Timeframe::M15, 300), Some("expired"))
        .await
        .unwrap_err();
    assert!(err.is_credential_rejection());
}

#[tokio::test]
async fn test_non_json_body_is_schema_error() {
    let (url, _) = spawn_bridge(StatusCode::OK, "<html>maintenance</html>").await;
    let source = source(url, &AuthConfig::default());

    let err = source
        .fetch_candles(&CandleRequest::new("XAUUSD", Timeframe::M15, 300), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LiveDataError::Schema(_)), "{err:?}");
}

#[test]
fn test_invalid_api_key_header_is_config_error() {
    let auth = AuthConfig {
        api_key: Some(Zeroizing::new("k".to_string())),
        api_key_header: "bad header".to_string(),
        ..AuthConfig::default()
    };
    let result = HttpBridgeSource::with_client(
        BridgeSourceConfig {
            url: "http://127.0.0.1:1/candles".to_string(),
            timeout: Duration::from_secs(1),
        },
        &auth,
        common::http_client(),
    );
    assert!(matches!(result, Err(LiveDataError::Config(_))));
}

#[tokio::test]
async fn test_slow_bridge_times_out_as_transport_error() {
    let app = Router::new().route(
        "/candles",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            json!({ "candles": [] }).to_string()
        }),
    );
    let base = common::spawn_http(app).await;
    let source = HttpBridgeSource::new(
        BridgeSourceConfig {
            url: format!("{base}/candles"),
            timeout: Duration::from_millis(300),
        },
        &AuthConfig::default(),
        common::tls_config(),
    )
    .expect("Failed to build bridge source");

    let started = std::time::Instant::now();
    let err = source
        .fetch_candles(&CandleRequest::new("XAUUSD", Timeframe::M15, 300), None)
        .await
        .unwrap_err();

    assert!(matches!(err, LiveDataError::Transport { .. }), "{err:?}");
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}
