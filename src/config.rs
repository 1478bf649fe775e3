//! Application configuration loaded from environment variables.
//!
//! The environment is read exactly once, at startup, into an immutable
//! [`AppConfig`] that is handed to each component.
//!
//! Candle source (one is required, `LIVE_DATA_URL` wins when both are set):
//! - `LIVE_DATA_URL`: HTTP bridge endpoint
//! - `ACCOUNT_ID`: trading account for the in-process SDK session
//!
//! Authentication (see [`crate::auth::resolve`] for precedence):
//! - `ACCESS_TOKEN`: static bearer token
//! - `TOKEN_URL`, `CLIENT_ID`, `CLIENT_SECRET`: client-credentials triple
//! - `API_KEY`: custom header value (header name from `API_KEY_HEADER`)
//!
//! Everything else has a default.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::source::SourceKind;

/// Default Open API WebSocket endpoint for the SDK source.
const DEFAULT_SDK_URL: &str = "wss://live.ctraderapi.com:5036";

/// Default header carrying `API_KEY`.
const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FRESHNESS_SECS: u64 = 30;
const DEFAULT_ALERT_MIN_CONFIDENCE: f64 = 0.8;
const DEFAULT_BRIDGE_HOST: &str = "0.0.0.0";
const DEFAULT_BRIDGE_PORT: u16 = 8787;
const DEFAULT_WATCHLIST: &str = "XAUUSD,EURUSD,US100";
const DEFAULT_INTERVAL: &str = "15m";
const DEFAULT_PERIOD: &str = "5d";
const DEFAULT_REFRESH_SECS: u64 = 30;

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub source: SourceConfig,
    pub feed: FeedConfig,
    pub tls: TlsConfig,
    /// `None` when `TELEGRAM_BOT_TOKEN` is not configured.
    pub alerts: Option<AlertConfig>,
    pub bridge: BridgeServerConfig,
    pub desk: DeskConfig,
}

/// Raw authentication inputs. Which of them is used is decided by
/// [`crate::auth::resolve`].
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub access_token: Option<Zeroizing<String>>,
    pub api_key: Option<Zeroizing<String>>,
    pub api_key_header: String,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Zeroizing<String>>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact<T>(v: &Option<T>) -> &'static str {
            if v.is_some() { "<set>" } else { "<unset>" }
        }

        f.debug_struct("AuthConfig")
            .field("access_token", &redact(&self.access_token))
            .field("api_key", &redact(&self.api_key))
            .field("api_key_header", &self.api_key_header)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

/// Where candles come from. Immutable after construction.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    HttpBridge(BridgeSourceConfig),
    Sdk(SdkConfig),
}

impl SourceConfig {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceConfig::HttpBridge(_) => SourceKind::HttpBridge,
            SourceConfig::Sdk(_) => SourceKind::Sdk,
        }
    }
}

/// HTTP bridge endpoint settings.
#[derive(Debug, Clone)]
pub struct BridgeSourceConfig {
    pub url: String,
    pub timeout: Duration,
}

/// In-process SDK session settings.
#[derive(Clone)]
pub struct SdkConfig {
    pub url: String,
    pub account_id: i64,
    /// Application credentials; application auth is skipped when absent.
    pub client_id: Option<String>,
    pub client_secret: Option<Zeroizing<String>>,
    pub timeout: Duration,
}

impl fmt::Debug for SdkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkConfig")
            .field("url", &self.url)
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Facade caching and validation policy.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// How long a Ready series is served without re-fetching.
    pub freshness: Duration,
    /// Reject series whose newest bar lags too far behind now.
    pub stale_guard: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(DEFAULT_FRESHNESS_SECS),
            stale_guard: true,
        }
    }
}

/// Extra trust anchors for outbound TLS.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub ca_cert_path: Option<PathBuf>,
}

/// Telegram alert delivery.
#[derive(Clone)]
pub struct AlertConfig {
    pub bot_token: Zeroizing<String>,
    /// Destination used when an event names none.
    pub default_chat_id: Option<String>,
    pub api_url: String,
    pub min_confidence: f64,
    pub timeout: Duration,
}

impl fmt::Debug for AlertConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertConfig")
            .field("default_chat_id", &self.default_chat_id)
            .field("api_url", &self.api_url)
            .field("min_confidence", &self.min_confidence)
            .finish_non_exhaustive()
    }
}

/// Listen address of the `candle-bridge` binary.
#[derive(Debug, Clone)]
pub struct BridgeServerConfig {
    pub host: String,
    pub port: u16,
}

/// Refresh loop settings of the `candle-desk` binary.
#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub watchlist: Vec<String>,
    pub interval: String,
    pub period: String,
    pub refresh: Duration,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`LiveDataError::Config`](crate::LiveDataError::Config) if no
/// candle source is configured or a numeric variable does not parse.
pub fn fetch_config() -> crate::Result<AppConfig> {
    AppConfig::from_lookup(non_empty_var)
}

/// Loads the `candle-bridge` configuration from environment variables.
///
/// # Errors
///
/// Same as [`AppConfig::sdk_only`].
pub fn fetch_bridge_config() -> crate::Result<AppConfig> {
    AppConfig::sdk_only(non_empty_var)
}

impl AppConfig {
    /// Builds the configuration from a variable lookup. `lookup` must
    /// return `None` for unset or empty variables.
    ///
    /// # Errors
    ///
    /// Same as [`fetch_config`].
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout = Duration::from_secs(parse_or(
            &lookup,
            "FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT_SECS,
        )?);

        let auth = AuthConfig {
            access_token: lookup("ACCESS_TOKEN").map(Zeroizing::new),
            api_key: lookup("API_KEY").map(Zeroizing::new),
            api_key_header: lookup("API_KEY_HEADER")
                .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            token_url: lookup("TOKEN_URL"),
            client_id: lookup("CLIENT_ID"),
            client_secret: lookup("CLIENT_SECRET").map(Zeroizing::new),
        };

        let source = match (lookup("LIVE_DATA_URL"), lookup("ACCOUNT_ID")) {
            (Some(url), _) => SourceConfig::HttpBridge(BridgeSourceConfig { url, timeout }),
            (None, Some(_)) => SourceConfig::Sdk(sdk_config(&lookup, &auth, timeout)?),
            (None, None) => {
                return Err(crate::LiveDataError::Config(
                    "no candle source configured: set LIVE_DATA_URL or ACCOUNT_ID".to_string(),
                ));
            }
        };

        let feed = FeedConfig {
            freshness: Duration::from_secs(parse_or(
                &lookup,
                "FRESHNESS_SECS",
                DEFAULT_FRESHNESS_SECS,
            )?),
            stale_guard: parse_or(&lookup, "STALE_GUARD", true)?,
        };

        let tls = TlsConfig {
            ca_cert_path: lookup("CA_CERT_PATH").map(PathBuf::from),
        };

        let alerts = match lookup("TELEGRAM_BOT_TOKEN") {
            Some(bot_token) => Some(AlertConfig {
                bot_token: Zeroizing::new(bot_token),
                default_chat_id: lookup("TELEGRAM_CHAT_ID"),
                api_url: lookup("TELEGRAM_API_URL")
                    .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
                min_confidence: parse_or(
                    &lookup,
                    "ALERT_MIN_CONFIDENCE",
                    DEFAULT_ALERT_MIN_CONFIDENCE,
                )?,
                timeout,
            }),
            None => None,
        };

        let bridge = BridgeServerConfig {
            host: lookup("BRIDGE_HOST").unwrap_or_else(|| DEFAULT_BRIDGE_HOST.to_string()),
            port: parse_or(&lookup, "BRIDGE_PORT", DEFAULT_BRIDGE_PORT)?,
        };

        let desk = DeskConfig {
            watchlist: lookup("WATCHLIST")
                .unwrap_or_else(|| DEFAULT_WATCHLIST.to_string())
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            interval: lookup("INTERVAL").unwrap_or_else(|| DEFAULT_INTERVAL.to_string()),
            period: lookup("PERIOD").unwrap_or_else(|| DEFAULT_PERIOD.to_string()),
            refresh: Duration::from_secs(parse_or(
                &lookup,
                "REFRESH_SECS",
                DEFAULT_REFRESH_SECS,
            )?),
        };

        Ok(AppConfig {
            auth,
            source,
            feed,
            tls,
            alerts,
            bridge,
            desk,
        })
    }

    /// Builds a configuration from a fixed set of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> crate::Result<Self> {
        Self::from_lookup(|name| vars.get(name).filter(|v| !v.is_empty()).cloned())
    }

    /// SDK settings regardless of which source the dashboard uses. The
    /// bridge process always fronts the SDK.
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Config`](crate::LiveDataError::Config) if
    /// `ACCOUNT_ID` is missing or invalid.
    pub fn sdk_only<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::from_lookup(|name| {
            if name == "LIVE_DATA_URL" {
                None
            } else {
                lookup(name)
            }
        })?;
        if !matches!(config.source, SourceConfig::Sdk(_)) {
            return Err(crate::LiveDataError::Config(
                "the bridge requires ACCOUNT_ID".to_string(),
            ));
        }
        // The bridge never fails a request because the market is closed.
        config.feed.stale_guard = false;
        Ok(config)
    }
}

fn sdk_config<F>(lookup: &F, auth: &AuthConfig, timeout: Duration) -> crate::Result<SdkConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup("ACCOUNT_ID").unwrap_or_default();
    let account_id = raw.trim().parse().map_err(|_| {
        crate::LiveDataError::Config(format!("ACCOUNT_ID must be numeric, got {raw:?}"))
    })?;

    Ok(SdkConfig {
        url: lookup("SDK_URL").unwrap_or_else(|| DEFAULT_SDK_URL.to_string()),
        account_id,
        client_id: auth.client_id.clone(),
        client_secret: auth.client_secret.clone(),
        timeout,
    })
}

/// Parses an optional variable, falling back to `default` when unset.
fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> crate::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            crate::LiveDataError::Config(format!("{name} has an invalid value: {raw:?}"))
        }),
        None => Ok(default),
    }
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> crate::Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(&map)
    }

    /// Helper that temporarily sets env vars, runs `f`, then restores originals.
    ///
    /// # Safety
    ///
    /// Only one test in this crate touches the process environment, so no
    /// other thread reads these variables concurrently.
    fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
        let originals: Vec<(&str, Option<String>)> = vars
            .iter()
            .map(|(k, _)| (*k, std::env::var(k).ok()))
            .collect();

        for (k, v) in vars {
            // SAFETY: see the function docs.
            unsafe {
                match v {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }

        f();

        for (k, original) in originals {
            // SAFETY: restoring original values, same context.
            unsafe {
                match original {
                    Some(val) => std::env::set_var(k, val),
                    None => std::env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn fetch_config_reads_process_environment() {
        with_env(
            &[
                ("LIVE_DATA_URL", Some("http://127.0.0.1:8787/candles")),
                ("ACCOUNT_ID", None),
                ("FETCH_TIMEOUT_SECS", Some("")),
                ("FRESHNESS_SECS", None),
                ("STALE_GUARD", None),
                ("TELEGRAM_BOT_TOKEN", None),
            ],
            || {
                let config = fetch_config().unwrap();
                match config.source {
                    SourceConfig::HttpBridge(bridge) => {
                        assert_eq!(bridge.url, "http://127.0.0.1:8787/candles");
                        assert_eq!(bridge.timeout, Duration::from_secs(10));
                    }
                    other => panic!("expected bridge source, got {other:?}"),
                }
            },
        );
    }

    #[test]
    fn defaults_with_bridge_url_only() {
        let config = config(&[("LIVE_DATA_URL", "http://bridge/candles")]).unwrap();

        assert_eq!(config.source.kind(), SourceKind::HttpBridge);
        assert_eq!(config.auth.api_key_header, "X-API-Key");
        assert_eq!(config.feed.freshness, Duration::from_secs(30));
        assert!(config.feed.stale_guard);
        assert!(config.alerts.is_none());
        assert_eq!(config.bridge.port, 8787);
        assert_eq!(config.desk.watchlist, vec!["XAUUSD", "EURUSD", "US100"]);
    }

    #[test]
    fn account_id_selects_sdk() {
        let config = config(&[
            ("ACCOUNT_ID", "4242"),
            ("CLIENT_ID", "app"),
            ("CLIENT_SECRET", "shh"),
        ])
        .unwrap();

        match config.source {
            SourceConfig::Sdk(sdk) => {
                assert_eq!(sdk.account_id, 4242);
                assert_eq!(sdk.url, DEFAULT_SDK_URL);
                assert_eq!(sdk.client_id.as_deref(), Some("app"));
                assert_eq!(sdk.client_secret.as_deref().map(String::as_str), Some("shh"));
            }
            other => panic!("expected sdk source, got {other:?}"),
        }
    }

    #[test]
    fn bridge_url_wins_over_account_id() {
        let config = config(&[("LIVE_DATA_URL", "http://bridge"), ("ACCOUNT_ID", "1")]).unwrap();
        assert_eq!(config.source.kind(), SourceKind::HttpBridge);
    }

    #[test]
    fn rejects_missing_source() {
        let err = config(&[("ACCESS_TOKEN", "tok")]).unwrap_err();
        assert!(err.to_string().contains("no candle source configured"));
    }

    #[test]
    fn rejects_non_numeric_account_id() {
        let err = config(&[("ACCOUNT_ID", "abc")]).unwrap_err();
        assert!(err.to_string().contains("ACCOUNT_ID must be numeric"));
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = config(&[("LIVE_DATA_URL", "http://b"), ("FRESHNESS_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("FRESHNESS_SECS"));

        let err = config(&[("LIVE_DATA_URL", "http://b"), ("STALE_GUARD", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("STALE_GUARD"));
    }

    #[test]
    fn empty_values_treated_as_absent() {
        let config = config(&[("LIVE_DATA_URL", "http://b"), ("ACCESS_TOKEN", "")]).unwrap();
        assert!(config.auth.access_token.is_none());
    }

    #[test]
    fn telegram_settings() {
        let config = config(&[
            ("LIVE_DATA_URL", "http://b"),
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_ID", "-1001"),
            ("ALERT_MIN_CONFIDENCE", "0.75"),
        ])
        .unwrap();

        let alerts = config.alerts.unwrap();
        assert_eq!(alerts.default_chat_id.as_deref(), Some("-1001"));
        assert_eq!(alerts.min_confidence, 0.75);
        assert_eq!(alerts.api_url, "https://api.telegram.org");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = config(&[
            ("LIVE_DATA_URL", "http://b"),
            ("ACCESS_TOKEN", "super-secret-token"),
            ("TELEGRAM_BOT_TOKEN", "123:bot-secret"),
        ])
        .unwrap();

        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(!debug.contains("bot-secret"));
        assert!(debug.contains("<set>"));
    }

    #[test]
    fn sdk_only_ignores_bridge_url() {
        let vars: HashMap<&str, &str> =
            [("LIVE_DATA_URL", "http://b"), ("ACCOUNT_ID", "7")].into();
        let config =
            AppConfig::sdk_only(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.source.kind(), SourceKind::Sdk);
        assert!(!config.feed.stale_guard);

        let err = AppConfig::sdk_only(|name| (name == "LIVE_DATA_URL").then(|| "x".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("no candle source configured"));
    }
}
