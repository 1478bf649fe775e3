//! Shared test utilities: local servers and candle fixtures.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use candle_desk::config::{SdkConfig, TlsConfig};
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tungstenite::Message;
use zeroize::Zeroizing;

/// Access token the fake broker accepts.
pub const GOOD_TOKEN: &str = "good-token";

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn spawn_http(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });
    format!("http://{addr}")
}

/// HTTP client with default roots and a short timeout.
pub fn http_client() -> reqwest::Client {
    candle_desk::tls::build_http_client(&TlsConfig::default(), Duration::from_secs(5))
        .expect("Failed to build HTTP client")
}

/// Default TLS config for sources under test.
pub fn tls_config() -> rustls::ClientConfig {
    candle_desk::tls::build_tls_config(&TlsConfig::default()).expect("Failed to build TLS config")
}

/// `count` consistent records ending at `last`, one per `step`.
pub fn records(count: usize, last: DateTime<Utc>, step: chrono::Duration) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let ts = last - step * (count - 1 - i) as i32;
            let base = 2300.0 + i as f64;
            json!({
                "time": ts.to_rfc3339(),
                "open": base,
                "high": base + 2.5,
                "low": base - 1.5,
                "close": base + 1.0,
                "volume": 100 + i,
            })
        })
        .collect()
}

/// Records ending at the last whole minute.
pub fn recent_records(count: usize) -> Vec<Value> {
    let last = DateTime::from_timestamp(Utc::now().timestamp() / 60 * 60, 0)
        .expect("Failed to build timestamp");
    records(count, last, chrono::Duration::minutes(15))
}

/// A fake Open API endpoint over plain WebSocket.
pub struct FakeBroker {
    pub addr: SocketAddr,
    /// Accepted WebSocket connections.
    pub connections: Arc<AtomicUsize>,
    /// Trendbar requests answered.
    pub trendbar_requests: Arc<AtomicUsize>,
}

impl FakeBroker {
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn sdk_config(&self) -> SdkConfig {
        SdkConfig {
            url: self.url(),
            account_id: 42,
            client_id: Some("app-id".to_string()),
            client_secret: Some(Zeroizing::new("app-secret".to_string())),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Starts a broker that lists `XAUUSD`, `EURUSD` and `USOIL`, accepts
/// [`GOOD_TOKEN`], and answers trendbar requests with three bars whose
/// newest opened one minute ago.
///
/// Two more listed symbols misbehave: trendbars for `US500` fail with
/// `INCORRECT_BOUNDARIES`, and trendbars for `GER40` are never answered.
pub async fn spawn_broker() -> FakeBroker {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake broker");
    let addr = listener.local_addr().expect("Failed to read local addr");
    let connections = Arc::new(AtomicUsize::new(0));
    let trendbar_requests = Arc::new(AtomicUsize::new(0));

    let conns = connections.clone();
    let bars = trendbar_requests.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            conns.fetch_add(1, Ordering::SeqCst);
            let bars = bars.clone();
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();
                while let Some(Ok(Message::Text(text))) = read.next().await {
                    let request: Value = serde_json::from_str(text.as_str()).expect("bad frame");
                    let id = request["clientMsgId"].clone();
                    let payload = &request["payload"];
                    let (payload_type, body) = match request["payloadType"].as_u64() {
                        Some(2100) => (2101, json!({})),
                        Some(2102) if payload["accessToken"] == GOOD_TOKEN => {
                            (2103, json!({ "ctidTraderAccountId": payload["ctidTraderAccountId"] }))
                        }
                        Some(2102) => (
                            2142,
                            json!({
                                "errorCode": "CH_ACCESS_TOKEN_INVALID",
                                "description": "access token rejected"
                            }),
                        ),
                        Some(2114) => (
                            2115,
                            json!({ "symbol": [
                                { "symbolId": 1, "symbolName": "XAUUSD" },
                                { "symbolId": 2, "symbolName": "EURUSD" },
                                { "symbolId": 3, "symbolName": "USOIL" },
                                { "symbolId": 4, "symbolName": "US500" },
                                { "symbolId": 5, "symbolName": "GER40" },
                            ]}),
                        ),
                        Some(2137) if payload["symbolId"] == 4 => (
                            2142,
                            json!({
                                "errorCode": "INCORRECT_BOUNDARIES",
                                "description": "fromTimestamp is out of range"
                            }),
                        ),
                        Some(2137) if payload["symbolId"] == 5 => continue,
                        Some(2137) => {
                            bars.fetch_add(1, Ordering::SeqCst);
                            // Unsolicited heartbeat ahead of the answer.
                            let heartbeat = json!({ "payloadType": 51, "payload": {} });
                            let _ = write.send(Message::Text(heartbeat.to_string().into())).await;
                            (2138, json!({ "trendbar": trendbars() }))
                        }
                        _ => (50, json!({ "errorCode": "UNSUPPORTED_MESSAGE" })),
                    };
                    let response = json!({
                        "clientMsgId": id,
                        "payloadType": payload_type,
                        "payload": body,
                    });
                    if write
                        .send(Message::Text(response.to_string().into()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            });
        }
    });

    FakeBroker {
        addr,
        connections,
        trendbar_requests,
    }
}

/// Three M15 trendbars, the newest opened at the previous whole minute.
///
/// Prices are relative to `low` in units of 1e-5: the newest bar is
/// open 2345.10, high 2347.00, low 2344.00, close 2346.25.
pub fn trendbars() -> Vec<Value> {
    let newest = Utc::now().timestamp() / 60 - 1;
    (0..3i64)
        .map(|i| {
            json!({
                "volume": 1000 + i,
                "low": 234_400_000 - (2 - i) * 100_000,
                "deltaOpen": 110_000,
                "deltaHigh": 300_000,
                "deltaClose": 225_000,
                "utcTimestampInMinutes": newest - (2 - i) * 15,
            })
        })
        .collect()
}
