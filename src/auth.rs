//! Credential resolution and bearer-token acquisition.
//!
//! [`resolve`] picks the authentication mode from configuration alone;
//! [`TokenProvider`] then supplies the token for that mode, performing
//! the client-credentials exchange against `TOKEN_URL` when needed.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{AuthConfig, SourceConfig};
use crate::{LiveDataError, Result};

/// Tokens are treated as expired this long before the upstream expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// How the dashboard authenticates against the candle source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Pre-issued bearer token (`ACCESS_TOKEN`).
    StaticToken,
    /// Client id/secret exchanged at `TOKEN_URL`.
    ClientCredentials,
    /// No bearer token; at most a custom API-key header.
    None,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::StaticToken => "static-token",
            AuthMode::ClientCredentials => "client-credentials",
            AuthMode::None => "none",
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the authentication mode for a configuration.
///
/// Precedence is static token, then client credentials, then none. The
/// client-credentials triple is keyed on `TOKEN_URL`: when it is set,
/// `CLIENT_ID` and `CLIENT_SECRET` must be too. Mode `None` is only valid
/// for the HTTP bridge, since the SDK session always needs a token.
///
/// # Errors
///
/// Returns [`LiveDataError::Config`] for an incomplete triple or an SDK
/// source without any token flow.
pub fn resolve(auth: &AuthConfig, source: &SourceConfig) -> Result<AuthMode> {
    let triple_started = auth.token_url.is_some();

    if auth.access_token.is_some() {
        if triple_started {
            warn!("ACCESS_TOKEN takes precedence; ignoring TOKEN_URL client-credentials flow");
        }
        return Ok(AuthMode::StaticToken);
    }

    if triple_started {
        if auth.client_id.is_none() {
            return Err(LiveDataError::Config(
                "TOKEN_URL is set but CLIENT_ID is missing".to_string(),
            ));
        }
        if auth.client_secret.is_none() {
            return Err(LiveDataError::Config(
                "TOKEN_URL is set but CLIENT_SECRET is missing".to_string(),
            ));
        }
        return Ok(AuthMode::ClientCredentials);
    }

    match source {
        SourceConfig::HttpBridge(_) => Ok(AuthMode::None),
        SourceConfig::Sdk(_) => Err(LiveDataError::Config(
            "the SDK source needs ACCESS_TOKEN or TOKEN_URL + CLIENT_ID + CLIENT_SECRET"
                .to_string(),
        )),
    }
}

/// The credential currently held by a [`TokenProvider`].
#[derive(Clone)]
pub struct Credentials {
    pub mode: AuthMode,
    pub token: Option<Zeroizing<String>>,
    /// `None` means the token never expires.
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    fn empty(mode: AuthMode) -> Self {
        Self {
            mode,
            token: None,
            expiry: None,
        }
    }

    /// Returns the token if it is present and unexpired at `now`.
    pub fn usable_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.token.as_ref()?;
        match self.expiry {
            Some(expiry) if now >= expiry => None,
            _ => Some(token.as_str()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mode", &self.mode)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Body of a successful token exchange.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "accessToken")]
    access_token: Option<String>,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<u64>,
}

/// Client id/secret and the endpoint they are exchanged at.
struct ClientCredentials {
    token_url: String,
    client_id: String,
    client_secret: Zeroizing<String>,
}

/// Supplies bearer tokens for the resolved [`AuthMode`].
///
/// In client-credentials mode the cached token is guarded by an async
/// mutex that stays locked for the whole exchange, so concurrent callers
/// with an expired cache wait for the single in-flight exchange and reuse
/// its result.
pub struct TokenProvider {
    mode: AuthMode,
    client_credentials: Option<ClientCredentials>,
    http: reqwest::Client,
    cache: Mutex<Credentials>,
}

impl TokenProvider {
    /// Creates a provider for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Config`] if `auth` lacks the fields `mode`
    /// needs (i.e. `mode` was not produced by [`resolve`] for `auth`).
    pub fn new(mode: AuthMode, auth: &AuthConfig, http: reqwest::Client) -> Result<Self> {
        let mut cache = Credentials::empty(mode);
        let mut client_credentials = None;

        match mode {
            AuthMode::StaticToken => {
                let token = auth.access_token.clone().ok_or_else(|| {
                    LiveDataError::Config("static-token mode without ACCESS_TOKEN".to_string())
                })?;
                cache.token = Some(token);
            }
            AuthMode::ClientCredentials => {
                let (Some(token_url), Some(client_id), Some(client_secret)) = (
                    auth.token_url.clone(),
                    auth.client_id.clone(),
                    auth.client_secret.clone(),
                ) else {
                    return Err(LiveDataError::Config(
                        "client-credentials mode without TOKEN_URL, CLIENT_ID and CLIENT_SECRET"
                            .to_string(),
                    ));
                };
                client_credentials = Some(ClientCredentials {
                    token_url,
                    client_id,
                    client_secret,
                });
            }
            AuthMode::None => {}
        }

        Ok(Self {
            mode,
            client_credentials,
            http,
            cache: Mutex::new(cache),
        })
    }

    /// Returns the bearer token for the current mode, or `None` in mode
    /// [`AuthMode::None`].
    ///
    /// # Errors
    ///
    /// Returns [`LiveDataError::Auth`] if the token exchange fails. The
    /// provider never retries on its own.
    pub async fn get_token(&self) -> Result<Option<String>> {
        let Some(cc) = &self.client_credentials else {
            let cache = self.cache.lock().await;
            return Ok(cache.token.as_ref().map(|t| t.to_string()));
        };

        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.usable_token(Utc::now()) {
            return Ok(Some(token.to_string()));
        }

        let fresh = self.exchange(cc).await?;
        let token = fresh.token.as_ref().map(|t| t.to_string());
        *cache = fresh;
        Ok(token)
    }

    /// Discards a cached exchanged token so the next call re-exchanges.
    ///
    /// Static tokens are kept: there is nothing to refresh them from.
    pub async fn invalidate(&self) {
        if self.mode == AuthMode::ClientCredentials {
            let mut cache = self.cache.lock().await;
            *cache = Credentials::empty(self.mode);
            debug!("Discarded cached access token");
        }
    }

    /// Snapshot of the held credential.
    pub async fn credentials(&self) -> Credentials {
        self.cache.lock().await.clone()
    }

    /// Performs one client-credentials exchange.
    async fn exchange(&self, cc: &ClientCredentials) -> Result<Credentials> {
        debug!(token_url = %cc.token_url, "Exchanging client credentials");

        let response = self
            .http
            .post(&cc.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", cc.client_id.as_str()),
                ("client_secret", cc.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LiveDataError::auth(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LiveDataError::auth(format!("failed to read token response: {e}")))?;

        if !status.is_success() {
            return Err(LiveDataError::Auth {
                status: Some(status.as_u16()),
                message: format!("token endpoint returned {status}: {body}"),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| LiveDataError::Auth {
            status: Some(status.as_u16()),
            message: format!("malformed token response ({e}): {body}"),
        })?;

        let Some(access_token) = parsed.access_token.filter(|t| !t.is_empty()) else {
            return Err(LiveDataError::Auth {
                status: Some(status.as_u16()),
                message: format!("token response carries no access token: {body}"),
            });
        };

        let lifetime = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME)
            .saturating_sub(EXPIRY_SKEW);
        let expiry = Utc::now() + chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::zero());

        info!(expires_at = %expiry, "Obtained access token");
        Ok(Credentials {
            mode: AuthMode::ClientCredentials,
            token: Some(Zeroizing::new(access_token)),
            expiry: Some(expiry),
        })
    }
}
