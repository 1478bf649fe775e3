//! Crate-level error types.
//!
//! [`LiveDataError`] unifies every failure of the ingestion pipeline
//! (configuration, token acquisition, transport, payload shape, stale
//! data) behind a single enum. The Facade matches on [`ErrorKind`] to
//! decide retry-vs-surface; the dashboard uses it to label the
//! "data unavailable" state.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LiveDataError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum LiveDataError {
    /// Missing, malformed, or conflicting configuration. Fatal.
    #[error("configuration error: {0}")]
    Config(String),

    /// Token acquisition failed or the upstream rejected the credential.
    #[error("auth error: {message}")]
    Auth {
        /// Upstream HTTP status, when the failure came from an HTTP response.
        status: Option<u16>,
        message: String,
    },

    /// Network failure, timeout, vendor error, or non-2xx response.
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
        /// Raw response body, kept for diagnostics.
        body: Option<String>,
    },

    /// The payload violates the candle contract.
    #[error("schema error: {0}")]
    Schema(String),

    /// The newest candle is older than the allowed lag.
    #[error("stale data: last bar is {lag_minutes:.1} minutes old (limit {limit_minutes})")]
    Stale { lag_minutes: f64, limit_minutes: i64 },
}

impl LiveDataError {
    /// Builds a [`LiveDataError::Transport`] without an HTTP status.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
            body: None,
        }
    }

    /// Builds a [`LiveDataError::Auth`] without an HTTP status.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            status: None,
            message: message.into(),
        }
    }

    /// Returns the coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Stale { .. } => ErrorKind::Stale,
        }
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns `true` when the upstream rejected the credential, either
    /// explicitly or with HTTP 401.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, Self::Auth { .. }) || self.status() == Some(401)
    }
}

impl From<reqwest::Error> for LiveDataError {
    fn from(e: reqwest::Error) -> Self {
        let message = if e.is_timeout() {
            format!("request timed out: {e}")
        } else if e.is_connect() {
            format!("connection failed: {e}")
        } else {
            e.to_string()
        };
        Self::Transport {
            status: e.status().map(|s| s.as_u16()),
            message,
            body: None,
        }
    }
}

impl From<tungstenite::Error> for LiveDataError {
    fn from(e: tungstenite::Error) -> Self {
        Self::transport(format!("websocket error: {e}"))
    }
}

/// Coarse error category shown by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Auth,
    Transport,
    Schema,
    Stale,
}

impl ErrorKind {
    /// Short label for status lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Auth => "auth",
            ErrorKind::Transport => "transport",
            ErrorKind::Schema => "schema",
            ErrorKind::Stale => "stale",
        }
    }

    /// Whether a single immediate retry can plausibly help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Auth | ErrorKind::Transport)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
